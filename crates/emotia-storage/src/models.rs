use chrono::{DateTime, Utc};
use emotia_core::EmotionResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Persisted classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Dominant emotion label
    pub emotion: String,
    /// Full label -> score distribution as reported by the provider
    pub scores: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    #[must_use]
    pub fn new(result: &EmotionResult, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            emotion: result.label.clone(),
            scores: result.scores.clone(),
            created_at,
            ttl_secs: ttl.as_secs(),
        }
    }

    /// An entry is valid while its age is strictly below the TTL
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        let ttl = chrono::Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX));
        age >= ttl
    }

    #[must_use]
    pub fn to_result(&self) -> EmotionResult {
        EmotionResult::new(self.emotion.clone(), self.scores.clone())
    }
}
