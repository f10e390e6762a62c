use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by [`crate::ClassificationGateway::classify`]
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rate limit exceeded, retry in {}ms", retry_after.as_millis())]
    RateLimitExceeded { retry_after: Duration },

    #[error("classification endpoint is deprecated (HTTP 410)")]
    EndpointDeprecated,

    #[error("request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClassificationError {
    /// Whether the same request might succeed if tried again later
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::Transport(_) => true,
            Self::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            Self::Configuration(_) | Self::EndpointDeprecated => false,
        }
    }

    /// Suggested wait before retrying, when the failure carries one
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Unusable success payload; recovered locally as a neutral result
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed classification payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("classification payload contained no labels")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ClassificationError::Transport("reset".into()).is_retryable());
        assert!(ClassificationError::RateLimitExceeded {
            retry_after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(ClassificationError::RequestFailed {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ClassificationError::RequestFailed {
            status: 401,
            body: String::new()
        }
        .is_retryable());
        assert!(!ClassificationError::EndpointDeprecated.is_retryable());
        assert!(!ClassificationError::Configuration("no key".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_wait() {
        let err = ClassificationError::RateLimitExceeded {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "rate limit exceeded, retry in 1500ms");
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
    }
}
