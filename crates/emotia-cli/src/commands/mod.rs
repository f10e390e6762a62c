pub mod cache;
pub mod chat;
pub mod classify;
pub mod config;
pub mod helpers;
pub mod worker;
