//! Persistence errors.

use thiserror::Error;

/// Errors reported by a [`SummaryStore`](crate::SummaryStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("summary store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid record: {0}")]
    Invalid(String),
}
