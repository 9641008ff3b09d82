//! Concrete job implementations for precis.
//!
//! # Job Types
//!
//! - `summary.generate` - Summarize a document and persist the result
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use precis_job_queue::{JobQueue, QueueConfig};
//! use precis_jobs::{MemorySummaryStore, SummarizeExecutor, SummaryQueue};
//! use precis_summarizer::{Summarizer, SummarizerLimits, ThrottleGuard};
//!
//! fn build(client: Arc<dyn precis_summarizer::CompletionClient>) -> (Arc<SummaryQueue>, SummarizeExecutor) {
//!     let summarizer = Summarizer::new(client, Arc::new(ThrottleGuard::default()), SummarizerLimits::default());
//!     let queue = Arc::new(JobQueue::new(QueueConfig::default()));
//!     let executor = SummarizeExecutor::new(summarizer, Arc::new(MemorySummaryStore::new()));
//!     (queue, executor)
//! }
//! ```

mod error;
mod store;
mod summarize;

pub use error::StoreError;
pub use store::{MemorySummaryStore, RecordId, SummaryRecord, SummaryStore};
pub use summarize::{
    default_title, JobOutcome, SummarizeExecutor, SummarizePayload, SummaryJob, SummaryQueue,
};

/// Job type constants for type-safe job references.
pub mod job_types {
    pub const SUMMARY_GENERATE: &str = "summary.generate";
}
