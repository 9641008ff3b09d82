//! A fixed-size pool of tasks draining a [`JobQueue`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutionError;
use crate::executor::{JobContext, JobExecutor};
use crate::queue::JobQueue;
use crate::types::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    /// Upper bound on how long an idle worker sleeps before looking again.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Handle to running workers. Dropping it leaves the workers running until the
/// shutdown token is cancelled.
#[derive(Debug)]
pub struct WorkerPool {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<E: JobExecutor>(
        queue: Arc<JobQueue<E::Payload, E::Output>>,
        executor: Arc<E>,
        config: WorkerPoolConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        let handles = (0..concurrency)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    queue.clone(),
                    executor.clone(),
                    config,
                    shutdown.clone(),
                ))
            })
            .collect();
        tracing::info!(concurrency, job_type = executor.job_type(), "worker pool started");
        Self { shutdown, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop claiming new jobs and wait for in-flight ones to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn worker_loop<E: JobExecutor>(
    worker_id: usize,
    queue: Arc<JobQueue<E::Payload, E::Output>>,
    executor: Arc<E>,
    config: WorkerPoolConfig,
    shutdown: CancellationToken,
) {
    tracing::debug!(worker_id, "worker started");

    while !shutdown.is_cancelled() {
        queue.reclaim_expired().await;

        if let Some(pause) = executor.pause_for() {
            tracing::debug!(worker_id, pause_ms = pause.as_millis() as u64, "executor paused, leaving jobs waiting");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => continue,
            }
        }

        let Some(job) = queue.claim().await else {
            let wait = queue
                .next_ready_in()
                .await
                .map_or(config.poll_interval, |d| d.min(config.poll_interval));
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = queue.wait_for_work(wait) => {}
            }
            continue;
        };

        run_job(worker_id, &queue, &executor, job).await;
    }

    tracing::debug!(worker_id, "worker stopped");
}

async fn run_job<E: JobExecutor>(
    worker_id: usize,
    queue: &Arc<JobQueue<E::Payload, E::Output>>,
    executor: &Arc<E>,
    job: Job<E::Payload, E::Output>,
) {
    let id = job.id;
    let attempt = job.attempt();
    let ctx = JobContext::new(id, attempt, queue.clone());
    let task = {
        let executor = executor.clone();
        let payload = job.payload;
        // a separate task so a panicking executor fails the job instead of the worker
        tokio::spawn(async move { executor.execute(&ctx, &payload).await })
    };

    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(ExecutionError::retryable(format!("executor crashed: {e}"))),
    };

    match result {
        Ok(output) => {
            if let Err(e) = queue.complete(id, attempt, output).await {
                tracing::warn!(worker_id, job_id = %id, error = %e, "could not record completion");
            }
        }
        Err(err) => {
            if let Err(e) = queue.fail(id, attempt, &err).await {
                tracing::warn!(worker_id, job_id = %id, error = %e, "could not record failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobState, QueueConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` executions, then echoes the payload.
    struct Flaky {
        failures: usize,
        runs: AtomicUsize,
        pause: Mutex<Option<Duration>>,
    }

    impl Flaky {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                runs: AtomicUsize::new(0),
                pause: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl JobExecutor for Flaky {
        type Payload = String;
        type Output = String;

        fn job_type(&self) -> &str {
            "test.flaky"
        }

        fn pause_for(&self) -> Option<Duration> {
            *self.pause.lock().unwrap()
        }

        async fn execute(
            &self,
            ctx: &JobContext<String, String>,
            payload: &String,
        ) -> Result<String, ExecutionError> {
            ctx.report_progress(10).await;
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.failures {
                return Err(ExecutionError::retryable(format!("boom {}", ctx.attempt())));
            }
            if payload == "panic" {
                panic!("executor bug");
            }
            Ok(payload.to_uppercase())
        }
    }

    async fn wait_terminal(
        queue: &JobQueue<String, String>,
        id: crate::JobId,
    ) -> Job<String, String> {
        loop {
            let job = queue.get(id).await.unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pool_retries_until_success() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        let executor = Flaky::new(2);
        let pool = WorkerPool::spawn(
            queue.clone(),
            executor.clone(),
            WorkerPoolConfig {
                concurrency: 2,
                poll_interval: Duration::from_millis(100),
            },
            CancellationToken::new(),
        );

        let id = queue.enqueue("hello".into(), 0).await;
        let job = wait_terminal(&queue, id).await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result.as_deref(), Some("HELLO"));
        assert_eq!(job.attempts, 2);
        assert_eq!(executor.runs.load(Ordering::SeqCst), 3);

        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_exhausted_is_failed() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        let pool = WorkerPool::spawn(
            queue.clone(),
            Flaky::new(10),
            WorkerPoolConfig::default(),
            CancellationToken::new(),
        );

        let id = queue.enqueue("hello".into(), 0).await;
        let job = wait_terminal(&queue, id).await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("boom 3"));
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_executor_does_not_kill_the_pool() {
        let queue = Arc::new(JobQueue::new(QueueConfig {
            max_attempts: 1,
            ..QueueConfig::default()
        }));
        let pool = WorkerPool::spawn(
            queue.clone(),
            Flaky::new(0),
            WorkerPoolConfig {
                concurrency: 1,
                poll_interval: Duration::from_millis(100),
            },
            CancellationToken::new(),
        );

        let bad = queue.enqueue("panic".into(), 0).await;
        let job = wait_terminal(&queue, bad).await;
        assert_eq!(job.state, JobState::Failed);
        assert!(job.failure_reason.unwrap().contains("executor crashed"));

        let good = queue.enqueue("fine".into(), 0).await;
        assert_eq!(wait_terminal(&queue, good).await.state, JobState::Completed);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn paused_executor_leaves_jobs_waiting() {
        let queue = Arc::new(JobQueue::new(QueueConfig::default()));
        let executor = Flaky::new(0);
        *executor.pause.lock().unwrap() = Some(Duration::from_secs(1));
        let pool = WorkerPool::spawn(
            queue.clone(),
            executor.clone(),
            WorkerPoolConfig::default(),
            CancellationToken::new(),
        );

        let id = queue.enqueue("later".into(), 0).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(queue.get(id).await.unwrap().state, JobState::Waiting);
        assert_eq!(executor.runs.load(Ordering::SeqCst), 0);

        *executor.pause.lock().unwrap() = None;
        assert_eq!(wait_terminal(&queue, id).await.state, JobState::Completed);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let queue = Arc::new(JobQueue::<String, String>::new(QueueConfig::default()));
        let token = CancellationToken::new();
        let pool = WorkerPool::spawn(queue, Flaky::new(0), WorkerPoolConfig::default(), token.clone());
        assert_eq!(pool.len(), 5);
        pool.shutdown().await;
        assert!(token.is_cancelled());
    }
}
