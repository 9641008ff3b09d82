use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use precis_cache::MemoryCache;
use precis_jobs::SummaryQueue;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What the background maintenance task looks after.
#[derive(Debug, Clone)]
pub struct Maintenance {
    pub queue: Arc<SummaryQueue>,
    pub memory_cache: Option<MemoryCache>,
    pub snapshot_path: Option<PathBuf>,
    pub interval: Duration,
}

impl Maintenance {
    /// One pass: retention sweep, expired cache entries, queue snapshot.
    pub async fn run_once(&self) {
        let evicted = self.queue.sweep().await;
        let purged = self.memory_cache.as_ref().map_or(0, MemoryCache::purge_expired);
        if evicted > 0 || purged > 0 {
            tracing::debug!(evicted_jobs = evicted, purged_cache_entries = purged, "maintenance pass");
        }
        self.save_snapshot().await;
    }

    pub async fn save_snapshot(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        if let Err(e) = self.queue.save_snapshot(path).await {
            tracing::error!(path = %path.display(), error = %e, "failed to write queue snapshot");
        }
    }

    /// Spawn the periodic maintenance task. It stops when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
            // the first tick fires immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => self.run_once().await,
                }
            }
            tracing::debug!("maintenance task stopped");
        })
    }
}
