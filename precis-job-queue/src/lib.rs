//! In-process job queue for long-running summarize work.
//!
//! Jobs move `waiting → active → completed | failed`. Failed executions that
//! the executor marks retryable go back to `waiting` with exponential backoff
//! until the attempt budget is spent.
//!
//! # Architecture
//!
//! - [`JobQueue`] - job state, claiming, retry policy, retention and snapshots
//! - [`JobExecutor`] - trait implemented by concrete job handlers
//! - [`WorkerPool`] - a fixed number of tokio tasks draining the queue
//! - [`Job`] - the externally visible record of one job
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use precis_job_queue::{
//!     async_trait, ExecutionError, JobContext, JobExecutor, JobQueue, QueueConfig, WorkerPool,
//!     WorkerPoolConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct Shout;
//!
//! #[async_trait]
//! impl JobExecutor for Shout {
//!     type Payload = String;
//!     type Output = String;
//!
//!     fn job_type(&self) -> &str {
//!         "demo.shout"
//!     }
//!
//!     async fn execute(
//!         &self,
//!         _ctx: &JobContext<String, String>,
//!         payload: &String,
//!     ) -> Result<String, ExecutionError> {
//!         Ok(payload.to_uppercase())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = Arc::new(JobQueue::new(QueueConfig::default()));
//!     let pool = WorkerPool::spawn(
//!         queue.clone(),
//!         Arc::new(Shout),
//!         WorkerPoolConfig::default(),
//!         CancellationToken::new(),
//!     );
//!     let id = queue.enqueue("hello".to_string(), 0).await;
//!     println!("enqueued {id}");
//!     pool.shutdown().await;
//! }
//! ```

mod error;
mod executor;
mod queue;
mod snapshot;
mod types;
mod worker;

pub use error::{ExecutionError, JobQueueError};
pub use executor::{JobContext, JobExecutor};
pub use queue::{FailOutcome, JobQueue};
pub use snapshot::QueueSnapshot;
pub use types::{Job, JobId, JobState, QueueConfig, QueueStats, RetentionPolicy};
pub use worker::{WorkerPool, WorkerPoolConfig};

// Re-export async_trait for convenience when implementing JobExecutor
pub use async_trait::async_trait;
