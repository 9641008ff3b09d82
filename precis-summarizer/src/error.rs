use std::time::Duration;

use crate::throttle::whole_secs;

/// Classified outcome of a failed summarize call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummarizeError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("summarization unavailable: {0}")]
    Configuration(String),
    #[error("rate limit exceeded, retry in {} seconds", whole_secs(.retry_after))]
    RateLimited { retry_after: Duration },
    #[error("completion service error: {message}")]
    Upstream { transient: bool, message: String },
}

impl SummarizeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SummarizeError::InvalidInput(message.into())
    }

    /// Whether a later attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SummarizeError::RateLimited { .. } => true,
            SummarizeError::Upstream { transient, .. } => *transient,
            SummarizeError::InvalidInput(_) | SummarizeError::Configuration(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SummarizeError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SummarizeError::InvalidInput(_) => "invalid_input",
            SummarizeError::Configuration(_) => "configuration",
            SummarizeError::RateLimited { .. } => "rate_limited",
            SummarizeError::Upstream { .. } => "upstream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_classification() {
        assert!(SummarizeError::RateLimited {
            retry_after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(SummarizeError::Upstream {
            transient: true,
            message: "timeout".into()
        }
        .is_retryable());
        assert!(!SummarizeError::Upstream {
            transient: false,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!SummarizeError::invalid("too short").is_retryable());
        assert!(!SummarizeError::Configuration("no key".into()).is_retryable());
    }

    #[test]
    fn rate_limited_message_rounds_up() {
        let err = SummarizeError::RateLimited {
            retry_after: Duration::from_millis(29_400),
        };
        assert_eq!(err.to_string(), "rate limit exceeded, retry in 30 seconds");
        assert_eq!(err.kind(), "rate_limited");
    }
}
