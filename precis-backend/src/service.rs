//! Caller-facing operations: the synchronous summarize path, job submission
//! and the read-only job status tracker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use precis_cache::{CacheStats, CacheStore};
use precis_job_queue::{JobId, JobState, QueueStats};
use precis_jobs::{JobOutcome, SummarizePayload, SummaryJob, SummaryQueue};
use precis_summarizer::{
    fingerprint, SummarizeError, Summarizer, SummaryOptions, SummaryResult, SummaryStyle,
    ThrottleStatus, CACHE_NAMESPACE,
};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Priority given to jobs submitted without one. Lower numbers run first.
pub const DEFAULT_JOB_PRIORITY: i32 = 1;

/// Option values used when a request leaves them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryDefaults {
    pub max_length: u32,
    pub style: SummaryStyle,
}

impl Default for SummaryDefaults {
    fn default() -> Self {
        let options = SummaryOptions::default();
        Self {
            max_length: options.max_length,
            style: options.style,
        }
    }
}

/// Outcome of [`SummaryService::synchronous_summarize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub summary: SummaryResult,
    /// True when the result was served from the cache store.
    pub cached: bool,
}

/// Read-only view of a job for status polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    pub result: Option<JobOutcome>,
    pub failure_reason: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<SummaryJob> for JobStatusView {
    fn from(job: SummaryJob) -> Self {
        Self {
            id: job.id,
            state: job.state,
            progress: job.progress,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            result: job.result,
            failure_reason: job.failure_reason,
            enqueued_at: job.enqueued_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

type Flight = Arc<OnceCell<Result<SyncSummary, SummarizeError>>>;

/// Removes a finished flight from the in-flight map when its caller is done,
/// including when the caller's future is dropped mid-await.
struct FlightGuard<'a> {
    in_flight: &'a DashMap<String, Flight>,
    key: &'a str,
    flight: Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // an unfinished cell stays so the next caller can pick up the work
        self.in_flight
            .remove_if(self.key, |_, v| Arc::ptr_eq(v, &self.flight) && v.initialized());
    }
}

/// Everything the HTTP layer needs, built once at startup and shared by `Arc`.
pub struct SummaryService {
    summarizer: Summarizer,
    cache: CacheStore,
    queue: Arc<SummaryQueue>,
    defaults: SummaryDefaults,
    in_flight: DashMap<String, Flight>,
}

impl std::fmt::Debug for SummaryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryService")
            .field("summarizer", &self.summarizer)
            .field("cache", &self.cache)
            .field("defaults", &self.defaults)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl SummaryService {
    pub fn new(
        summarizer: Summarizer,
        cache: CacheStore,
        queue: Arc<SummaryQueue>,
        defaults: SummaryDefaults,
    ) -> Self {
        Self {
            summarizer,
            cache,
            queue,
            defaults,
            in_flight: DashMap::new(),
        }
    }

    pub fn queue(&self) -> &Arc<SummaryQueue> {
        &self.queue
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    /// Resolve request options against the configured defaults.
    pub fn options(
        &self,
        max_length: Option<u32>,
        style: Option<&str>,
    ) -> Result<SummaryOptions, SummarizeError> {
        let style = match style.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s
                .parse::<SummaryStyle>()
                .map_err(|e| SummarizeError::invalid(e.to_string()))?,
            None => self.defaults.style,
        };
        Ok(SummaryOptions::new(
            max_length.unwrap_or(self.defaults.max_length),
            style,
        ))
    }

    /// Summarize `text` now, reusing a cached result when one exists.
    ///
    /// Concurrent callers with the same fingerprint share one upstream call.
    pub async fn synchronous_summarize(
        &self,
        text: &str,
        options: &SummaryOptions,
    ) -> Result<SyncSummary, SummarizeError> {
        self.summarizer.validate(text, options)?;
        let key = fingerprint(text, options);

        if let Some(summary) = self.cache.get::<SummaryResult>(&key).await {
            debug!(%key, "serving cached summary");
            return Ok(SyncSummary {
                summary,
                cached: true,
            });
        }

        let flight = {
            let entry = self
                .in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()));
            Arc::clone(entry.value())
        };
        let _guard = FlightGuard {
            in_flight: &self.in_flight,
            key: &key,
            flight: Arc::clone(&flight),
        };

        let outcome = flight
            .get_or_init(|| self.summarize_and_cache(&key, text, options))
            .await
            .clone();
        outcome
    }

    async fn summarize_and_cache(
        &self,
        key: &str,
        text: &str,
        options: &SummaryOptions,
    ) -> Result<SyncSummary, SummarizeError> {
        // a previous flight may have filled the cache while this one was queued
        if let Some(summary) = self.cache.get::<SummaryResult>(key).await {
            return Ok(SyncSummary {
                summary,
                cached: true,
            });
        }
        let summary = self.summarizer.summarize(text, options).await?;
        self.cache.set(key, &summary, None).await;
        Ok(SyncSummary {
            summary,
            cached: false,
        })
    }

    /// Record a summarize job. Never waits on the upstream.
    pub async fn enqueue_summarize(
        &self,
        text: &str,
        options: SummaryOptions,
        owner_id: &str,
        title: Option<String>,
        priority: Option<i32>,
    ) -> Result<JobId, SummarizeError> {
        if owner_id.trim().is_empty() {
            return Err(SummarizeError::invalid("ownerId is required"));
        }
        self.summarizer.validate(text, &options)?;

        let payload = SummarizePayload {
            text: text.to_string(),
            options,
            owner_id: owner_id.to_string(),
            title: title.filter(|t| !t.trim().is_empty()),
        };
        let job_id = self.queue.enqueue(payload, priority.unwrap_or(DEFAULT_JOB_PRIORITY)).await;
        info!(%job_id, %owner_id, "summary job queued");
        Ok(job_id)
    }

    /// `None` for ids the queue does not know, including evicted jobs.
    pub async fn get_job_status(&self, job_id: JobId) -> Option<JobStatusView> {
        self.queue.get(job_id).await.map(JobStatusView::from)
    }

    pub async fn get_queue_stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    pub fn get_throttle_status(&self) -> ThrottleStatus {
        self.summarizer.throttle().status()
    }

    pub fn upstream_configured(&self) -> bool {
        self.summarizer.is_configured()
    }

    /// Drop every cached summary. Returns how many entries were removed.
    pub async fn clear_cache(&self) -> u64 {
        let cleared = self.cache.clear(CACHE_NAMESPACE).await;
        info!(cleared, "summary cache cleared");
        cleared
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
