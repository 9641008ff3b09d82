//! The `summary.generate` job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use precis_job_queue::{async_trait, ExecutionError, Job, JobContext, JobExecutor, JobQueue};
use precis_summarizer::{SummarizeError, Summarizer, SummaryOptions, SummaryResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::job_types;
use crate::store::{RecordId, SummaryStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizePayload {
    pub text: String,
    pub options: SummaryOptions,
    pub owner_id: String,
    /// Falls back to [`default_title`] when absent.
    pub title: Option<String>,
}

/// Result recorded on a completed summarize job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub record_id: RecordId,
    pub summary: SummaryResult,
}

pub type SummaryQueue = JobQueue<SummarizePayload, JobOutcome>;
pub type SummaryJob = Job<SummarizePayload, JobOutcome>;

/// `Summary YYYY-MM-DD`.
pub fn default_title(now: DateTime<Utc>) -> String {
    format!("Summary {}", now.format("%Y-%m-%d"))
}

/// Map a summarize failure onto the queue's retry policy. The message keeps
/// the classification so it survives into `failureReason`.
fn execution_error(err: &SummarizeError) -> ExecutionError {
    let message = format!("{}: {}", err.kind(), err);
    let base = if err.is_retryable() {
        ExecutionError::retryable(message)
    } else {
        ExecutionError::permanent(message)
    };
    match err.retry_after() {
        Some(retry_after) => base.with_retry_after(retry_after),
        None => base,
    }
}

/// Executor for `summary.generate` jobs.
///
/// Progress: 10 once started, 70 once the summary exists, 100 once stored.
pub struct SummarizeExecutor {
    summarizer: Summarizer,
    store: Arc<dyn SummaryStore>,
}

impl std::fmt::Debug for SummarizeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizeExecutor")
            .field("summarizer", &self.summarizer)
            .finish_non_exhaustive()
    }
}

impl SummarizeExecutor {
    pub fn new(summarizer: Summarizer, store: Arc<dyn SummaryStore>) -> Self {
        Self { summarizer, store }
    }
}

#[async_trait]
impl JobExecutor for SummarizeExecutor {
    type Payload = SummarizePayload;
    type Output = JobOutcome;

    fn job_type(&self) -> &str {
        job_types::SUMMARY_GENERATE
    }

    /// Keep jobs waiting while the upstream is cooling down.
    fn pause_for(&self) -> Option<Duration> {
        self.summarizer.throttle().cooldown_remaining()
    }

    async fn execute(
        &self,
        ctx: &JobContext<SummarizePayload, JobOutcome>,
        payload: &SummarizePayload,
    ) -> Result<JobOutcome, ExecutionError> {
        ctx.report_progress(10).await;

        let summary = self
            .summarizer
            .summarize(&payload.text, &payload.options)
            .await
            .map_err(|e| execution_error(&e))?;
        ctx.report_progress(70).await;

        let title = payload
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_title(Utc::now()));
        let record_id = self
            .store
            .save_result(&payload.owner_id, &title, &payload.text, &summary)
            .await
            .map_err(|e| ExecutionError::retryable(format!("persistence: {e}")))?;
        ctx.report_progress(100).await;

        info!(
            job_id = %ctx.job_id(),
            %record_id,
            words = summary.summary_word_count,
            "summary job finished"
        );
        Ok(JobOutcome { record_id, summary })
    }
}
