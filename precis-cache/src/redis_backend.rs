//! Redis-backed cache shared between processes (last write wins).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use crate::backend::CacheBackend;
use crate::error::CacheError;

const SCAN_BATCH: usize = 200;

/// Cache backend talking to a Redis server.
///
/// The connection is opened lazily on first use; if Redis is down the attempt
/// is retried on the next call, so a cache that starts unreachable recovers on
/// its own once the server comes back.
pub struct RedisCache {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("connected", &self.conn.initialized())
            .finish()
    }
}

impl RedisCache {
    /// Build a backend for `url` without connecting yet.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.conn
            .get_or_try_init(|| async {
                let conn = self
                    .client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(unavailable)?;
                tracing::info!("redis cache connected");
                Ok::<_, CacheError>(conn)
            })
            .await
            .cloned()
    }
}

/// `PX` argument for `ttl`. The server rejects zero, so sub-millisecond TTLs
/// round up to one millisecond.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::unavailable(err.to_string())
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(unavailable)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(unavailable)
    }

    async fn clear(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            if !keys.is_empty() {
                let dropped: u64 = conn.del(&keys).await.map_err(unavailable)?;
                removed += dropped;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_keeps_millisecond_precision() {
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(ttl_millis(Duration::from_millis(250)), 250);
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn bad_url_is_reported_as_unavailable() {
        assert!(matches!(
            RedisCache::open("not a url"),
            Err(CacheError::Unavailable(_))
        ));
    }

    /// Needs a running server: `REDIS_URL=redis://127.0.0.1/ cargo test --features redis -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn sub_second_ttl_expires() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let cache = RedisCache::open(&url).unwrap();
        let key = format!("precis-test:{}", std::process::id());

        cache
            .set(&key, "v".into(), Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }
}
