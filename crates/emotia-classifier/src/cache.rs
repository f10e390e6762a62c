//! TTL response cache over a pluggable key/value store.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use emotia_storage::{CacheEntry, Database};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Namespace prefix applied to every cache key
pub const CACHE_KEY_PREFIX: &str = "emotion_";

/// Normalize text into its cache key: trim, lower-case, then prefix
#[must_use]
pub fn cache_key(text: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{}", text.trim().to_lowercase())
}

/// Persistence provider for cache entries.
///
/// Methods are called synchronously from async code, so implementations must be
/// fast and must not block on network I/O.
pub trait CacheStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read
    fn read_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written
    fn write_cache_entry(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written
    fn delete_cache_entries(&self, keys: &[String]) -> Result<usize>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read
    fn cache_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

impl CacheStore for Database {
    fn read_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        Self::read_cache_entry(self, key)
    }

    fn write_cache_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        Self::write_cache_entry(self, key, entry)
    }

    fn delete_cache_entries(&self, keys: &[String]) -> Result<usize> {
        Self::delete_cache_entries(self, keys)
    }

    fn cache_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Self::cache_keys_with_prefix(self, prefix)
    }
}

/// Process-local store, used when no database is wanted
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))
    }
}

impl CacheStore for MemoryStore {
    fn read_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn write_cache_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.entries()?.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn delete_cache_entries(&self, keys: &[String]) -> Result<usize> {
        let mut entries = self.entries()?;
        Ok(keys.iter().filter(|key| entries.remove(*key).is_some()).count())
    }

    fn cache_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Classification results keyed by normalized text.
///
/// Expired entries are never returned, whether or not a sweep has removed
/// them yet.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResponseCache {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry; store failures count as a miss
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Utc::now())
    }

    #[must_use]
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        match self.store.read_cache_entry(key) {
            Ok(Some(entry)) if !entry.is_expired(now) => Some(entry),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Cache read failed for {key}: {e:#}");
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if the store rejects the write
    pub fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.store.write_cache_entry(key, entry)
    }

    /// Remove every namespaced entry and report how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or written
    pub fn clear(&self) -> Result<usize> {
        let keys = self.store.cache_keys_with_prefix(CACHE_KEY_PREFIX)?;
        let removed = self.store.delete_cache_entries(&keys)?;
        log::info!("Cleared {removed} cached classifications");
        Ok(removed)
    }

    /// Physically remove entries past their TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or written
    pub fn sweep_expired(&self) -> Result<usize> {
        self.sweep_expired_at(Utc::now())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or written
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = Vec::new();
        for key in self.store.cache_keys_with_prefix(CACHE_KEY_PREFIX)? {
            match self.store.read_cache_entry(&key) {
                Ok(Some(entry)) if entry.is_expired(now) => expired.push(key),
                Ok(_) => {}
                // Unreadable rows can never be served, drop them too
                Err(e) => {
                    log::debug!("Dropping unreadable cache entry {key}: {e:#}");
                    expired.push(key);
                }
            }
        }
        let removed = self.store.delete_cache_entries(&expired)?;
        if removed > 0 {
            log::info!("Swept {removed} expired cache entries");
        }
        Ok(removed)
    }
}

/// Run [`ResponseCache::sweep_expired`] now and then every `every`
pub fn spawn_cache_sweeper(cache: Arc<ResponseCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = cache.sweep_expired() {
                log::warn!("Cache sweep failed: {e:#}");
            }
        }
    })
}
