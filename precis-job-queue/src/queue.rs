//! Job state and the transitions between states.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{ExecutionError, JobQueueError};
use crate::types::{Job, JobId, JobState, QueueConfig, QueueStats, RetentionPolicy};

/// What [`JobQueue::fail`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Back to waiting; `attempt` is the new value of `Job::attempts`.
    Retrying { attempt: u32, delay: Duration },
    Failed,
}

pub(crate) struct Entry<P, R> {
    pub(crate) job: Job<P, R>,
    /// Enqueue order, for FIFO among equal priorities.
    pub(crate) seq: u64,
    pub(crate) ready_at: Instant,
    pub(crate) lease_until: Option<Instant>,
}

pub(crate) struct QueueState<P, R> {
    pub(crate) jobs: HashMap<JobId, Entry<P, R>>,
    next_seq: u64,
}

impl<P, R> Default for QueueState<P, R> {
    fn default() -> Self {
        Self {
            jobs: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<P, R> QueueState<P, R> {
    pub(crate) fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn count(&self, state: JobState) -> usize {
        self.jobs.values().filter(|e| e.job.state == state).count()
    }

    /// Evict terminal jobs beyond the count bound or older than the age bound.
    pub(crate) fn enforce_retention(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for (state, max_count, max_age) in [
            (
                JobState::Completed,
                policy.completed_max_count,
                policy.completed_max_age,
            ),
            (
                JobState::Failed,
                policy.failed_max_count,
                policy.failed_max_age,
            ),
        ] {
            let mut finished: Vec<(DateTime<Utc>, u64, JobId)> = self
                .jobs
                .values()
                .filter(|e| e.job.state == state)
                .map(|e| {
                    (
                        e.job.finished_at.unwrap_or(e.job.enqueued_at),
                        e.seq,
                        e.job.id,
                    )
                })
                .collect();
            // newest first
            finished.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

            let cutoff = chrono::Duration::from_std(max_age)
                .ok()
                .and_then(|age| now.checked_sub_signed(age));
            for (idx, (finished_at, _, id)) in finished.iter().enumerate() {
                let too_old = cutoff.is_some_and(|c| *finished_at < c);
                if idx >= max_count || too_old {
                    self.jobs.remove(id);
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// Wall-clock time `d` from now, saturating at now on overflow.
pub(crate) fn wall_after(d: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

pub(crate) fn instant_after(now: Instant, d: Duration) -> Instant {
    now.checked_add(d)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600))
}

/// The entry for `id`, provided it is active under `attempt`.
fn leased_entry<P, R>(
    state: &mut QueueState<P, R>,
    id: JobId,
    attempt: u32,
) -> Result<&mut Entry<P, R>, JobQueueError> {
    let entry = state.jobs.get_mut(&id).ok_or(JobQueueError::NotFound(id))?;
    if entry.job.state != JobState::Active {
        return Err(JobQueueError::NotActive(id));
    }
    if entry.job.attempt() != attempt {
        return Err(JobQueueError::Superseded { id, attempt });
    }
    Ok(entry)
}

fn apply_failure<P, R>(
    entry: &mut Entry<P, R>,
    err: &ExecutionError,
    config: &QueueConfig,
) -> FailOutcome {
    let job = &mut entry.job;
    entry.lease_until = None;
    job.lease_expires_at = None;
    job.failure_reason = Some(err.message.clone());

    if err.retryable && job.attempts + 1 < job.max_attempts {
        job.attempts += 1;
        let delay = config
            .backoff(job.attempts)
            .max(err.retry_after.unwrap_or_default());
        job.state = JobState::Waiting;
        job.progress = 0;
        job.started_at = None;
        job.run_at = wall_after(delay);
        entry.ready_at = instant_after(Instant::now(), delay);
        FailOutcome::Retrying {
            attempt: job.attempts,
            delay,
        }
    } else {
        job.state = JobState::Failed;
        job.finished_at = Some(Utc::now());
        FailOutcome::Failed
    }
}

/// A backlog of jobs and their status records.
///
/// All state sits behind one async mutex; workers are woken through a
/// [`Notify`] when work is enqueued.
pub struct JobQueue<P, R> {
    pub(crate) state: Mutex<QueueState<P, R>>,
    pub(crate) notify: Notify,
    config: QueueConfig,
}

impl<P, R> fmt::Debug for JobQueue<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("config", &self.config)
            .field("state", &"<Mutex<QueueState>>")
            .finish()
    }
}

impl<P, R> JobQueue<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Record a new job. Never waits on anything but the state lock.
    pub async fn enqueue(&self, payload: P, priority: i32) -> JobId {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let job = Job {
            id,
            payload,
            priority,
            state: JobState::Waiting,
            attempts: 0,
            max_attempts: self.config.max_attempts,
            progress: 0,
            result: None,
            failure_reason: None,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            run_at: now,
            lease_expires_at: None,
        };

        {
            let mut state = self.state.lock().await;
            let seq = state.take_seq();
            state.jobs.insert(
                id,
                Entry {
                    job,
                    seq,
                    ready_at: Instant::now(),
                    lease_until: None,
                },
            );
        }

        tracing::info!(job_id = %id, priority, "job enqueued");
        self.notify.notify_one();
        id
    }

    pub async fn get(&self, id: JobId) -> Option<Job<P, R>> {
        let state = self.state.lock().await;
        state.jobs.get(&id).map(|e| e.job.clone())
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            waiting: state.count(JobState::Waiting),
            active: state.count(JobState::Active),
            completed: state.count(JobState::Completed),
            failed: state.count(JobState::Failed),
            total: state.jobs.len(),
        }
    }

    /// Take the next ready job: lowest priority number, then earliest ready,
    /// then enqueue order.
    pub async fn claim(&self) -> Option<Job<P, R>> {
        let now = Instant::now();
        let lease = self.config.lease;
        let mut state = self.state.lock().await;

        let id = state
            .jobs
            .values()
            .filter(|e| e.job.state == JobState::Waiting && e.ready_at <= now)
            .min_by(|a, b| {
                a.job
                    .priority
                    .cmp(&b.job.priority)
                    .then(a.ready_at.cmp(&b.ready_at))
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|e| e.job.id)?;

        let entry = state.jobs.get_mut(&id)?;
        entry.lease_until = Some(instant_after(now, lease));
        let job = &mut entry.job;
        job.state = JobState::Active;
        job.progress = 0;
        job.started_at = Some(Utc::now());
        job.lease_expires_at = Some(wall_after(lease));
        let claimed = job.clone();
        drop(state);

        tracing::info!(job_id = %id, attempt = claimed.attempt(), "job active");
        Some(claimed)
    }

    /// Time until the earliest delayed waiting job becomes claimable.
    pub async fn next_ready_in(&self) -> Option<Duration> {
        let now = Instant::now();
        let state = self.state.lock().await;
        state
            .jobs
            .values()
            .filter(|e| e.job.state == JobState::Waiting)
            .map(|e| e.ready_at.saturating_duration_since(now))
            .min()
    }

    /// Raise an active job's progress and extend its lease. Returns false if
    /// the job is unknown, not active, or now running under another attempt.
    pub async fn report_progress(&self, id: JobId, attempt: u32, pct: u8) -> bool {
        let mut state = self.state.lock().await;
        let Ok(entry) = leased_entry(&mut *state, id, attempt) else {
            return false;
        };
        entry.job.progress = entry.job.progress.max(pct.min(100));
        entry.lease_until = Some(instant_after(Instant::now(), self.config.lease));
        entry.job.lease_expires_at = Some(wall_after(self.config.lease));
        tracing::debug!(job_id = %id, progress = entry.job.progress, "job progress");
        true
    }

    /// Record the output of execution `attempt`.
    pub async fn complete(&self, id: JobId, attempt: u32, output: R) -> Result<(), JobQueueError> {
        let mut state = self.state.lock().await;
        let entry = leased_entry(&mut *state, id, attempt)?;
        entry.lease_until = None;
        let job = &mut entry.job;
        job.state = JobState::Completed;
        job.progress = 100;
        job.result = Some(output);
        job.failure_reason = None;
        job.finished_at = Some(Utc::now());
        job.lease_expires_at = None;
        let attempts = job.attempts;

        let evicted = state.enforce_retention(&self.config.retention, Utc::now());
        drop(state);

        tracing::info!(job_id = %id, attempts, "job completed");
        if evicted > 0 {
            tracing::debug!(evicted, "evicted finished jobs");
        }
        Ok(())
    }

    /// Record a failed execution `attempt` and apply the retry policy.
    pub async fn fail(
        &self,
        id: JobId,
        attempt: u32,
        err: &ExecutionError,
    ) -> Result<FailOutcome, JobQueueError> {
        let mut state = self.state.lock().await;
        let entry = leased_entry(&mut *state, id, attempt)?;
        let outcome = apply_failure(entry, err, &self.config);
        if outcome == FailOutcome::Failed {
            state.enforce_retention(&self.config.retention, Utc::now());
        }
        drop(state);

        log_failure(id, err, outcome);
        Ok(outcome)
    }

    /// Treat active jobs whose lease ran out as failed, retryable executions.
    pub async fn reclaim_expired(&self) -> usize {
        let now = Instant::now();
        let expired = ExecutionError::retryable("lease expired");
        let mut reclaimed = Vec::new();
        let mut state = self.state.lock().await;
        for entry in state.jobs.values_mut() {
            let lapsed = entry.job.state == JobState::Active
                && entry.lease_until.is_some_and(|until| until <= now);
            if lapsed {
                let outcome = apply_failure(entry, &expired, &self.config);
                reclaimed.push((entry.job.id, outcome));
            }
        }
        if reclaimed
            .iter()
            .any(|(_, outcome)| *outcome == FailOutcome::Failed)
        {
            state.enforce_retention(&self.config.retention, Utc::now());
        }
        drop(state);

        for (id, outcome) in &reclaimed {
            log_failure(*id, &expired, *outcome);
        }
        reclaimed.len()
    }

    /// Apply the retention policy to every finished job.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.enforce_retention(&self.config.retention, now);
        if removed > 0 {
            tracing::debug!(removed, "retention sweep");
        }
        removed
    }

    /// Wait until something is enqueued or `timeout` passes. Returns true when
    /// woken by new work.
    pub async fn wait_for_work(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }
}

fn log_failure(id: JobId, err: &ExecutionError, outcome: FailOutcome) {
    match outcome {
        FailOutcome::Retrying { attempt, delay } => tracing::warn!(
            job_id = %id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "job failed, retry scheduled"
        ),
        FailOutcome::Failed => tracing::error!(job_id = %id, error = %err, "job failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetentionPolicy;

    type Queue = JobQueue<String, String>;

    fn queue() -> Queue {
        JobQueue::new(QueueConfig::default())
    }

    #[tokio::test]
    async fn success_path() {
        let q = queue();
        let id = q.enqueue("doc".into(), 0).await;
        assert_eq!(q.get(id).await.unwrap().state, JobState::Waiting);

        let job = q.claim().await.unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.state, JobState::Active);
        assert!(job.lease_expires_at.is_some());
        assert!(q.claim().await.is_none());

        assert!(q.report_progress(id, 1, 10).await);
        assert!(q.report_progress(id, 1, 5).await);
        assert_eq!(q.get(id).await.unwrap().progress, 10);

        q.complete(id, 1, "done".into()).await.unwrap();
        let job = q.get(id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result.as_deref(), Some("done"));
        assert_eq!(job.attempts, 0);
        assert!(job.finished_at.is_some());

        // terminal jobs take no more transitions
        assert!(!q.report_progress(id, 1, 50).await);
        assert!(matches!(
            q.complete(id, 1, "again".into()).await,
            Err(JobQueueError::NotActive(_))
        ));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let q = queue();
        let missing = Uuid::new_v4();
        assert!(q.get(missing).await.is_none());
        assert!(matches!(
            q.fail(missing, 1, &ExecutionError::permanent("x")).await,
            Err(JobQueueError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_then_fail_terminally() {
        let q = queue();
        let id = q.enqueue("doc".into(), 0).await;
        let mut delays = Vec::new();

        loop {
            // wait out any backoff
            if let Some(wait) = q.next_ready_in().await {
                tokio::time::advance(wait).await;
            }
            let job = q.claim().await.unwrap();
            q.report_progress(job.id, job.attempt(), 40).await;
            match q
                .fail(id, job.attempt(), &ExecutionError::retryable("upstream 503"))
                .await
                .unwrap()
            {
                FailOutcome::Retrying { attempt, delay } => {
                    let job = q.get(id).await.unwrap();
                    assert_eq!(job.state, JobState::Waiting);
                    assert_eq!(job.attempts, attempt);
                    assert_eq!(job.progress, 0);
                    assert!(q.claim().await.is_none(), "claimable before backoff");
                    delays.push(delay);
                }
                FailOutcome::Failed => break,
            }
        }

        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        let job = q.get(id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.failure_reason.as_deref(), Some("upstream 503"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_stretches_the_delay() {
        let q = queue();
        let id = q.enqueue("doc".into(), 0).await;
        q.claim().await.unwrap();
        let err = ExecutionError::retryable("rate limited").with_retry_after(Duration::from_secs(30));
        let outcome = q.fail(id, 1, &err).await.unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retrying {
                attempt: 1,
                delay: Duration::from_secs(30)
            }
        );
        assert_eq!(q.next_ready_in().await, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let q = queue();
        let id = q.enqueue("doc".into(), 0).await;
        q.claim().await.unwrap();
        let outcome = q.fail(id, 1, &ExecutionError::permanent("bad input")).await.unwrap();
        assert_eq!(outcome, FailOutcome::Failed);
        assert_eq!(q.get(id).await.unwrap().attempts, 0);
        assert_eq!(q.stats().await.failed, 1);
    }

    #[tokio::test]
    async fn priority_then_fifo() {
        let q = queue();
        let background = q.enqueue("background".into(), 5).await;
        let first = q.enqueue("first".into(), 1).await;
        let second = q.enqueue("second".into(), 1).await;
        let urgent = q.enqueue("urgent".into(), 0).await;

        assert_eq!(q.claim().await.unwrap().id, urgent);
        assert_eq!(q.claim().await.unwrap().id, first);
        assert_eq!(q.claim().await.unwrap().id, second);
        assert_eq!(q.claim().await.unwrap().id, background);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_makes_job_claimable_again() {
        let q = JobQueue::<String, String>::new(QueueConfig {
            lease: Duration::from_secs(10),
            ..QueueConfig::default()
        });
        let id = q.enqueue("doc".into(), 0).await;
        q.claim().await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        q.report_progress(id, 1, 10).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        // progress pushed the lease out
        assert_eq!(q.reclaim_expired().await, 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(q.reclaim_expired().await, 1);
        let job = q.get(id).await.unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.failure_reason.as_deref(), Some("lease expired"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(q.claim().await.unwrap().id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn reclaimed_attempt_cannot_touch_its_successor() {
        let q = JobQueue::<String, String>::new(QueueConfig {
            lease: Duration::from_secs(10),
            ..QueueConfig::default()
        });
        let id = q.enqueue("doc".into(), 0).await;
        let stale = q.claim().await.unwrap().attempt();
        assert_eq!(stale, 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(q.reclaim_expired().await, 1);
        // between the reclaim and the next claim the job is only waiting
        assert!(!q.report_progress(id, stale, 50).await);
        assert!(matches!(
            q.complete(id, stale, "late".into()).await,
            Err(JobQueueError::NotActive(_))
        ));

        tokio::time::advance(Duration::from_secs(2)).await;
        let current = q.claim().await.unwrap().attempt();
        assert_eq!(current, 2);

        assert!(!q.report_progress(id, stale, 90).await);
        assert!(matches!(
            q.complete(id, stale, "late".into()).await,
            Err(JobQueueError::Superseded { attempt: 1, .. })
        ));
        assert!(matches!(
            q.fail(id, stale, &ExecutionError::permanent("late")).await,
            Err(JobQueueError::Superseded { .. })
        ));
        let job = q.get(id).await.unwrap();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.progress, 0);

        assert!(q.report_progress(id, current, 30).await);
        q.complete(id, current, "fresh".into()).await.unwrap();
        let job = q.get(id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn retention_keeps_newest_completed() {
        let q = JobQueue::<String, String>::new(QueueConfig {
            retention: RetentionPolicy {
                completed_max_count: 2,
                ..RetentionPolicy::default()
            },
            ..QueueConfig::default()
        });
        let mut ids = Vec::new();
        for i in 0..3 {
            let id = q.enqueue(format!("doc {i}"), 0).await;
            q.claim().await.unwrap();
            q.complete(id, 1, "ok".into()).await.unwrap();
            ids.push(id);
        }
        assert!(q.get(ids[0]).await.is_none());
        assert!(q.get(ids[1]).await.is_some());
        assert!(q.get(ids[2]).await.is_some());
        assert_eq!(q.stats().await.completed, 2);
    }

    #[tokio::test]
    async fn sweep_drops_jobs_past_their_age() {
        let q = queue();
        let done = q.enqueue("done".into(), 0).await;
        q.claim().await.unwrap();
        q.complete(done, 1, "ok".into()).await.unwrap();
        let failed = q.enqueue("failed".into(), 0).await;
        q.claim().await.unwrap();
        q.fail(failed, 1, &ExecutionError::permanent("nope")).await.unwrap();
        let waiting = q.enqueue("waiting".into(), 0).await;

        // a day later only the completed job has aged out
        let later = Utc::now() + chrono::Duration::hours(25);
        assert_eq!(q.sweep_at(later).await, 1);
        assert!(q.get(done).await.is_none());
        assert!(q.get(failed).await.is_some());
        assert!(q.get(waiting).await.is_some());

        let much_later = Utc::now() + chrono::Duration::days(8);
        assert_eq!(q.sweep_at(much_later).await, 1);
        assert!(q.get(failed).await.is_none());
        assert_eq!(q.stats().await.total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_work_wakes_on_enqueue() {
        let q = std::sync::Arc::new(queue());
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.wait_for_work(Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        q.enqueue("doc".into(), 0).await;
        assert!(waiter.await.unwrap());

        // the wakeup was consumed; nothing new arrives
        assert!(!q.wait_for_work(Duration::from_millis(10)).await);
    }
}
