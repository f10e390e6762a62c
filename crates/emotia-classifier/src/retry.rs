//! Bounded retry around a single outbound call.
//!
//! Throttled responses (429) wait for the server's hint and do not consume an
//! attempt. Transport failures back off linearly and do.

use emotia_core::ClassifierConfig;
use std::future::Future;
use std::time::Duration;

use crate::provider::{RawResponse, TransportFailure};

/// Wait applied to a 429 that carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Parse a `Retry-After` value given in whole seconds
#[must_use]
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    header_value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transport attempts; zero behaves like one
    pub max_retries: u32,
    pub base_backoff: Duration,
    /// Cap on consecutive throttle waits; `None` retries throttling forever
    pub max_throttle_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(1000),
            max_throttle_retries: None,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: config.base_backoff(),
            max_throttle_retries: config.max_throttle_retries,
        }
    }

    /// Linear backoff: `base * (attempt + 1)`
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(attempt.saturating_add(1))
    }

    const fn attempts(&self) -> u32 {
        if self.max_retries == 0 {
            1
        } else {
            self.max_retries
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryingCaller {
    policy: RetryPolicy,
}

impl RetryingCaller {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive `send` until it yields a non-throttled response or attempts run out.
    ///
    /// Any response other than 429, including error statuses, is returned as-is.
    /// When the throttle cap is reached the last 429 is returned.
    ///
    /// # Errors
    ///
    /// Returns the last [`TransportFailure`] once every attempt has failed.
    pub async fn call<F, Fut>(&self, mut send: F) -> Result<RawResponse, TransportFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RawResponse, TransportFailure>>,
    {
        let attempts = self.policy.attempts();
        let mut attempt = 0;
        let mut throttled = 0;

        loop {
            match send().await {
                Ok(response) if response.is_throttled() => {
                    if self
                        .policy
                        .max_throttle_retries
                        .is_some_and(|cap| throttled >= cap)
                    {
                        log::warn!("Still throttled after {throttled} waits, giving up");
                        return Ok(response);
                    }
                    throttled += 1;
                    let wait = response.retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                    log::warn!("Throttled by endpoint, retrying in {}ms", wait.as_millis());
                    tokio::time::sleep(wait).await;
                }
                Ok(response) => return Ok(response),
                Err(failure) => {
                    throttled = 0;
                    if attempt + 1 >= attempts {
                        log::error!("Request failed after {attempts} attempts: {failure}");
                        return Err(failure);
                    }
                    let wait = self.policy.backoff_for(attempt);
                    log::warn!(
                        "Request attempt {} failed: {failure}; retrying in {}ms",
                        attempt + 1,
                        wait.as_millis()
                    );
                    attempt += 1;
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InferenceProvider;
    use crate::testing::ScriptedProvider;
    use tokio::time::Instant;

    fn caller(max_retries: u32) -> RetryingCaller {
        RetryingCaller::new(RetryPolicy {
            max_retries,
            base_backoff: Duration::from_millis(1000),
            max_throttle_retries: None,
        })
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("2")), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(Some(" 10 ")), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_returned_immediately() {
        let provider = ScriptedProvider::new().then_status(500, "boom");
        let response = caller(3).call(|| provider.send("k", "t")).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_waits_for_hint_without_consuming_attempt() {
        let provider = ScriptedProvider::new()
            .then_throttled(Some(Duration::from_secs(2)))
            .then_status(200, "[]");
        let start = Instant::now();

        let response = caller(1).call(|| provider.send("k", "t")).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_without_hint_waits_default() {
        let provider = ScriptedProvider::new()
            .then_throttled(None)
            .then_status(200, "[]");
        let start = Instant::now();

        caller(1).call(|| provider.send("k", "t")).await.unwrap();
        assert!(start.elapsed() >= DEFAULT_RETRY_AFTER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_back_off_linearly() {
        let provider = ScriptedProvider::new()
            .then_failure("reset")
            .then_failure("reset")
            .then_status(200, "[]");
        let start = Instant::now();

        let response = caller(3).call(|| provider.send("k", "t")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(provider.calls(), 3);
        // 1000ms after the first failure, 2000ms after the second
        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert!(start.elapsed() < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_propagate_failure() {
        let provider = ScriptedProvider::new()
            .then_failure("a")
            .then_failure("b")
            .then_failure("c")
            .then_status(200, "[]");

        let err = caller(3).call(|| provider.send("k", "t")).await.unwrap_err();
        assert_eq!(err, TransportFailure("c".to_string()));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_cap_returns_last_429() {
        let provider = ScriptedProvider::new()
            .then_throttled(None)
            .then_throttled(None)
            .then_throttled(None);
        let caller = RetryingCaller::new(RetryPolicy {
            max_throttle_retries: Some(2),
            ..RetryPolicy::default()
        });

        let response = caller.call(|| provider.send("k", "t")).await.unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_cap_counts_consecutive_waits() {
        let provider = ScriptedProvider::new()
            .then_throttled(None)
            .then_failure("reset")
            .then_throttled(None)
            .then_throttled(None)
            .then_status(200, "[]");
        let caller = RetryingCaller::new(RetryPolicy {
            max_throttle_retries: Some(2),
            ..RetryPolicy::default()
        });

        let response = caller.call(|| provider.send("k", "t")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(provider.calls(), 5);
    }
}
