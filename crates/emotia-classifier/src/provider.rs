use anyhow::{Context, Result};
use async_trait::async_trait;
use emotia_core::ClassifierConfig;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::retry::parse_retry_after;

/// Status, retry hint and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, if the server sent a usable one
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    #[must_use]
    pub const fn is_throttled(&self) -> bool {
        self.status == 429
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// The request never produced a response (DNS, connect, timeout, reset)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportFailure(pub String);

/// Remote endpoint performing the actual inference
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Issue one classification request for `text`
    async fn send(&self, credential: &str, text: &str) -> Result<RawResponse, TransportFailure>;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}

/// Hugging Face hosted inference API
pub struct HuggingFaceProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl HuggingFaceProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        Self::new(&config.endpoint, &config.model, config.request_timeout())
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("{}/models/{}", self.endpoint, self.model)
    }

    #[must_use]
    pub fn request_body(text: &str) -> serde_json::Value {
        json!({
            "inputs": text,
            "options": {
                "use_cache": true,
                "wait_for_model": true
            }
        })
    }
}

#[async_trait]
impl InferenceProvider for HuggingFaceProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send(&self, credential: &str, text: &str) -> Result<RawResponse, TransportFailure> {
        let response = self
            .client
            .post(self.url())
            .bearer_auth(credential)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&Self::request_body(text))
            .send()
            .await
            .map_err(|e| TransportFailure(format!("Failed to reach {}: {e}", self.model)))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
        );
        let body = response
            .text()
            .await
            .map_err(|e| TransportFailure(format!("Failed to read response body: {e}")))?;

        log::debug!("{} responded with status {status}", self.model);
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}
