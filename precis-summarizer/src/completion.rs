use std::time::Duration;

use async_trait::async_trait;

use crate::options::SummaryOptions;

/// One request to the completion service.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub text: &'a str,
    pub options: &'a SummaryOptions,
}

/// Failures reported by a [`CompletionClient`], before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("request to completion service timed out")]
    Timeout,
    #[error("completion service unreachable: {0}")]
    Transport(String),
    #[error("completion service rejected the credentials: {0}")]
    Unauthorized(String),
    #[error("completion service account has insufficient credits")]
    PaymentRequired,
    #[error("completion service is overloaded")]
    Overloaded { retry_after: Option<Duration> },
    #[error("completion service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("completion service returned an unusable response: {0}")]
    Malformed(String),
}

/// The external text-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// `Err` carries a human readable reason when the client cannot be used at
    /// all, e.g. missing credentials.
    fn is_configured(&self) -> Result<(), String> {
        Ok(())
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError>;
}
