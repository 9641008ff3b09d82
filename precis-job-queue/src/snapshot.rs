//! Persisting the queue across restarts.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::JobQueueError;
use crate::queue::{instant_after, Entry, JobQueue};
use crate::types::{Job, JobState};

const SNAPSHOT_VERSION: u32 = 1;

/// Every job the queue knows about, in enqueue order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot<P, R> {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub jobs: Vec<Job<P, R>>,
}

impl<P, R> JobQueue<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub async fn snapshot(&self) -> QueueSnapshot<P, R> {
        let state = self.state.lock().await;
        let mut entries: Vec<&Entry<P, R>> = state.jobs.values().collect();
        entries.sort_by_key(|e| e.seq);
        QueueSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            jobs: entries.into_iter().map(|e| e.job.clone()).collect(),
        }
    }

    /// Load jobs from a snapshot. Jobs that were active when the snapshot was
    /// taken had their worker die with the process, so they start over as
    /// waiting. Returns the number of jobs loaded.
    pub async fn restore(&self, snapshot: QueueSnapshot<P, R>) -> Result<usize, JobQueueError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(JobQueueError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let wall_now = Utc::now();
        let now = Instant::now();
        let mut loaded = 0;
        let mut requeued = 0;
        {
            let mut state = self.state.lock().await;
            for mut job in snapshot.jobs {
                if job.state == JobState::Active {
                    job.state = JobState::Waiting;
                    job.progress = 0;
                    job.started_at = None;
                    job.lease_expires_at = None;
                    requeued += 1;
                }
                // a run_at in the past means ready now
                let delay = (job.run_at - wall_now).to_std().unwrap_or(Duration::ZERO);
                let seq = state.take_seq();
                state.jobs.insert(
                    job.id,
                    Entry {
                        job,
                        seq,
                        ready_at: instant_after(now, delay),
                        lease_until: None,
                    },
                );
                loaded += 1;
            }
            state.enforce_retention(&self.config().retention, wall_now);
        }

        tracing::info!(loaded, requeued, "restored job queue snapshot");
        self.notify.notify_waiters();
        Ok(loaded)
    }
}

impl<P, R> JobQueue<P, R>
where
    P: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
    R: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Write a snapshot to `path` atomically (temp file, then rename).
    pub async fn save_snapshot(&self, path: &Path) -> Result<usize, JobQueueError> {
        let snapshot = self.snapshot().await;
        let count = snapshot.jobs.len();
        let bytes =
            serde_json::to_vec(&snapshot).map_err(|e| JobQueueError::Snapshot(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::debug!(path = %path.display(), jobs = count, "saved job queue snapshot");
        Ok(count)
    }

    /// Restore from `path`. A missing file is an empty queue, not an error.
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize, JobQueueError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let snapshot: QueueSnapshot<P, R> =
            serde_json::from_slice(&bytes).map_err(|e| JobQueueError::Snapshot(e.to_string()))?;
        self.restore(snapshot).await
    }
}
