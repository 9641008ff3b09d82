//! Typed, degrading facade over a [`CacheBackend`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::CacheBackend;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Backend failures that were swallowed (reads served as misses, writes skipped).
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// The cache store shared by the synchronous and asynchronous call paths.
///
/// Every operation is best effort: when the backend is unreachable reads become
/// misses and writes become no-ops. Nothing here returns an error.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
    counters: Arc<Counters>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up `key` and decode it. Undecodable values are dropped and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "cache miss");
                return None;
            }
            Err(error) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, %error, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "cache hit");
                Some(value)
            }
            Err(error) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, %error, "dropping undecodable cache entry");
                let _ = self.backend.delete(key).await;
                None
            }
        }
    }

    /// Store `value` for `ttl` (or the default TTL). Returns whether the write landed.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(error) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, %error, "cache value could not be encoded, skipping write");
                return false;
            }
        };
        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.backend.set(key, encoded, ttl).await {
            Ok(()) => {
                tracing::debug!(%key, ttl_secs = ttl.as_secs(), "cached value");
                true
            }
            Err(error) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, %error, "cache write failed, skipping");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(()) => true,
            Err(error) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, %error, "cache delete failed");
                false
            }
        }
    }

    /// Drop every entry under `prefix`. Returns 0 when the backend is unreachable.
    pub async fn clear(&self, prefix: &str) -> u64 {
        match self.backend.clear(prefix).await {
            Ok(removed) => {
                tracing::info!(%prefix, removed, "cleared cache entries");
                removed
            }
            Err(error) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%prefix, %error, "cache clear failed");
                0
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}
