//! Cache backend trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Raw key/value store with per-entry time-to-live.
///
/// Values are opaque strings (the facade stores JSON). Implementations must be
/// safe under concurrent use and must make `set` atomic: a reader observes
/// either the previous entry or the new one, never a partial write.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and stats.
    fn name(&self) -> &'static str;

    /// Fetch a live entry. Entries past their expiry behave exactly like a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous entry wholesale.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a single entry. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every entry whose key starts with `prefix`, returning how many were dropped.
    async fn clear(&self, prefix: &str) -> Result<u64, CacheError>;
}
