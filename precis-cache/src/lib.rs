//! Content-addressed TTL cache used to avoid repeating expensive upstream calls.
//!
//! Caching here is an optimization, never a correctness dependency. Backends
//! report [`CacheError::Unavailable`] when they cannot reach their store, and
//! the [`CacheStore`] facade turns every such failure into a miss or a no-op so
//! callers only ever see one code path.
//!
//! # Architecture
//!
//! - [`CacheBackend`] - pluggable raw key/value store with per-entry TTL
//! - [`MemoryCache`] - process-local backend built on `DashMap`
//! - `RedisCache` - shared backend (enabled with the `redis` feature)
//! - [`CacheStore`] - typed, degrading facade shared by all call paths

mod backend;
mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_backend;
mod store;

pub use backend::CacheBackend;
pub use error::CacheError;
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis_backend::RedisCache;
pub use store::{CacheStats, CacheStore};

// Re-export async_trait for convenience when implementing CacheBackend
pub use async_trait::async_trait;
