//! Error types for the job queue.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that may occur while interacting with the job queue.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("job {0} is not active")]
    NotActive(Uuid),

    /// The job was reclaimed and handed to a newer execution.
    #[error("attempt {attempt} of job {id} no longer holds the lease")]
    Superseded { id: Uuid, attempt: u32 },

    #[error("invalid queue snapshot: {0}")]
    Snapshot(String),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure returned by a [`JobExecutor`](crate::JobExecutor); the queue's
/// retry policy decides what happens next.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub retryable: bool,
    /// Minimum delay before the next attempt, when the cause dictates one.
    pub retry_after: Option<Duration>,
}

impl ExecutionError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}
