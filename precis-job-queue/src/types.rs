//! Core types for the job queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// Returns true if this state is final.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// A unit of asynchronous work, from submission to its final state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job<P, R> {
    pub id: JobId,
    pub payload: P,
    /// Lower runs first.
    pub priority: i32,
    pub state: JobState,
    /// Failed executions that were rescheduled.
    pub attempts: u32,
    pub max_attempts: u32,
    /// 0..=100, never decreases within one attempt.
    pub progress: u8,
    pub result: Option<R>,
    pub failure_reason: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Earliest time the job may be claimed.
    pub run_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl<P, R> Job<P, R> {
    /// 1-based number of the execution a claim hands out.
    pub fn attempt(&self) -> u32 {
        self.attempts + 1
    }
}

/// Counts of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// How long finished jobs are kept around for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub completed_max_count: usize,
    pub completed_max_age: Duration,
    pub failed_max_count: usize,
    pub failed_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_count: 100,
            completed_max_age: Duration::from_secs(24 * 3600),
            failed_max_count: 50,
            failed_max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each later one.
    pub backoff_base: Duration,
    /// How long an active job may go without a progress report.
    pub lease: Duration,
    pub retention: RetentionPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(2000),
            lease: Duration::from_secs(300),
            retention: RetentionPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// Backoff before retry number `n` (1-based): `base * 2^(n-1)`.
    pub fn backoff(&self, n: u32) -> Duration {
        let exp = n.saturating_sub(1).min(20);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}
