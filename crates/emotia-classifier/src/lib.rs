//! Classification gateway: sliding-window rate limiting, a TTL response cache
//! and a retrying HTTP caller composed into a single `classify` operation.

pub mod cache;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod rate_limiter;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{cache_key, spawn_cache_sweeper, CacheStore, MemoryStore, ResponseCache};
pub use dispatch::{handle_line, handle_request, serve, WorkerRequest, WorkerResponse};
pub use error::{ClassificationError, ParseError};
pub use gateway::{parse_payload, ClassificationGateway};
pub use provider::{HuggingFaceProvider, InferenceProvider, RawResponse, TransportFailure};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
pub use retry::{parse_retry_after, RetryPolicy, RetryingCaller};
