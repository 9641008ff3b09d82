//! Error types for cache backends.

use thiserror::Error;

/// Errors reported by a [`CacheBackend`](crate::CacheBackend).
///
/// These never escape [`CacheStore`](crate::CacheStore); they exist so that
/// backends can describe what went wrong for the logs.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend is unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
