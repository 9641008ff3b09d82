//! Job executor trait for implementing job handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::queue::JobQueue;
use crate::types::JobId;

/// Handle given to a running job.
pub struct JobContext<P, R> {
    job_id: JobId,
    attempt: u32,
    queue: Arc<JobQueue<P, R>>,
}

impl<P, R> JobContext<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(job_id: JobId, attempt: u32, queue: Arc<JobQueue<P, R>>) -> Self {
        Self {
            job_id,
            attempt,
            queue,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// 1-based number of the execution in progress.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record progress (clamped to 100) and extend the job's lease.
    pub async fn report_progress(&self, pct: u8) {
        if !self.queue.report_progress(self.job_id, self.attempt, pct).await {
            tracing::debug!(job_id = %self.job_id, attempt = self.attempt, pct, "progress ignored, attempt no longer holds the job");
        }
    }
}

/// Trait for implementing job executors.
///
/// The worker pool owns the retry loop; an executor only reports whether a
/// failure is worth retrying via [`ExecutionError::retryable`].
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;

    /// Returns the job type this executor handles.
    fn job_type(&self) -> &str;

    /// Back-pressure signal. While `Some`, workers leave jobs waiting and check
    /// again after the given delay.
    fn pause_for(&self) -> Option<Duration> {
        None
    }

    async fn execute(
        &self,
        ctx: &JobContext<Self::Payload, Self::Output>,
        payload: &Self::Payload,
    ) -> Result<Self::Output, ExecutionError>;
}
