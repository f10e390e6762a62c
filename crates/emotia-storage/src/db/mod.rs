//! Database operations split into domain-specific modules.
//!
//! This module re-exports the main Database struct and all its operations.

mod cache_entries;
mod helpers;

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::migrations;
use crate::models::CacheEntry;

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new database connection
    ///
    /// # Errors
    ///
    /// Returns an error if database directory creation, connection opening, or schema initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(path) => path,
            None => Self::default_db_path()?,
        };

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        migrations::init_schema(&conn)?;

        log::info!("Database initialized at: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrations::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get default database path
    fn default_db_path() -> Result<PathBuf> {
        Ok(emotia_core::get_data_dir()?.join("cache.db"))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    // ==================== Cache Entry Methods ====================

    /// Read the entry stored under `key`, expired or not
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is malformed
    pub fn read_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        cache_entries::read_cache_entry(&*self.conn()?, key)
    }

    /// Insert or replace the entry stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn write_cache_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        cache_entries::write_cache_entry(&*self.conn()?, key, entry)
    }

    /// Delete the given keys and report how many rows were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn delete_cache_entries(&self, keys: &[String]) -> Result<usize> {
        cache_entries::delete_cache_entries(&*self.conn()?, keys)
    }

    /// List every stored key that starts with `prefix`
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn cache_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        cache_entries::cache_keys_with_prefix(&*self.conn()?, prefix)
    }
}
