use anyhow::Result;
use chrono::Utc;
use emotia_core::{Config, CredentialProvider, EmotionResult};
use emotia_storage::CacheEntry;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{cache_key, CacheStore, ResponseCache};
use crate::error::{ClassificationError, ParseError};
use crate::provider::{HuggingFaceProvider, InferenceProvider};
use crate::rate_limiter::{RateLimitStatus, RateLimiter};
use crate::retry::{RetryPolicy, RetryingCaller};

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

/// Extract the dominant label and score map from a success body.
///
/// Accepts either an array of `{label, score}` or an array wrapping one such
/// array. The highest score wins and its label is lower-cased.
///
/// # Errors
///
/// Returns [`ParseError`] if the body is not one of those shapes or has no labels
pub fn parse_payload(body: &str) -> Result<EmotionResult, ParseError> {
    let mut labels = match serde_json::from_str::<Payload>(body)? {
        Payload::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
        Payload::Flat(labels) => labels,
    };
    if labels.is_empty() {
        return Err(ParseError::Empty);
    }

    labels.sort_by(|a, b| b.score.total_cmp(&a.score));
    let dominant = labels[0].label.to_lowercase();
    let scores: BTreeMap<String, f64> = labels
        .into_iter()
        .map(|entry| (entry.label, entry.score))
        .collect();
    Ok(EmotionResult::new(dominant, scores))
}

/// Rate limiting, caching and retrying composed into one `classify` call
pub struct ClassificationGateway {
    provider: Arc<dyn InferenceProvider>,
    credentials: Arc<dyn CredentialProvider>,
    limiter: RateLimiter,
    cache: Arc<ResponseCache>,
    caller: RetryingCaller,
}

impl ClassificationGateway {
    #[must_use]
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        credentials: Arc<dyn CredentialProvider>,
        limiter: RateLimiter,
        cache: Arc<ResponseCache>,
        caller: RetryingCaller,
    ) -> Self {
        Self {
            provider,
            credentials,
            limiter,
            cache,
            caller,
        }
    }

    /// Build a gateway talking to the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn from_config(config: &Config, store: Arc<dyn CacheStore>) -> Result<Self> {
        let provider = HuggingFaceProvider::from_config(&config.classifier)?;
        log::debug!("Classifying with model {}", provider.model_name());
        Ok(Self::new(
            Arc::new(provider),
            Arc::new(config.clone()),
            RateLimiter::from_config(&config.rate_limit),
            Arc::new(ResponseCache::new(store, config.cache.ttl())),
            RetryingCaller::new(RetryPolicy::from_config(&config.classifier)),
        ))
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.status()
    }

    /// Classify `text`, short-circuiting on blank input, cache hits and quota.
    ///
    /// Unusable success payloads fall back to neutral and are not cached.
    ///
    /// # Errors
    ///
    /// See [`ClassificationError`]; parse failures are never surfaced.
    pub async fn classify(&self, text: &str) -> Result<EmotionResult, ClassificationError> {
        if text.trim().is_empty() {
            return Ok(EmotionResult::neutral());
        }

        let credential = self.credentials.credential().ok_or_else(|| {
            ClassificationError::Configuration("no API credential configured".to_string())
        })?;

        let key = cache_key(text);
        if let Some(entry) = self.cache.get(&key) {
            log::debug!("Cache hit for {key}");
            return Ok(entry.to_result());
        }

        self.limiter
            .try_acquire()
            .map_err(|retry_after| ClassificationError::RateLimitExceeded { retry_after })?;

        let credential = credential.as_str();
        let response = self
            .caller
            .call(|| self.provider.send(credential, text))
            .await
            .map_err(|failure| ClassificationError::Transport(failure.0))?;

        if response.status == 410 {
            log::error!("Model {} is no longer served", self.provider.model_name());
            return Err(ClassificationError::EndpointDeprecated);
        }
        if !response.is_success() {
            return Err(ClassificationError::RequestFailed {
                status: response.status,
                body: response.body,
            });
        }

        let result = match parse_payload(&response.body) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Falling back to neutral: {e}");
                return Ok(EmotionResult::neutral());
            }
        };

        let entry = CacheEntry::new(&result, Utc::now(), self.cache.ttl());
        if let Err(e) = self.cache.put(&key, &entry) {
            log::warn!("Failed to cache classification for {key}: {e:#}");
        }
        Ok(result)
    }
}
