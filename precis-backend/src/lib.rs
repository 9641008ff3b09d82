//! HTTP surface and service wiring for precis.
//!
//! [`service::SummaryService`] holds the synchronous path (cache lookup with
//! single-flight coalescing), job submission and the job status tracker;
//! [`build_router`] exposes it under `/api`.

pub mod app;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod service;
pub mod state;

pub use app::build_router;
pub use bootstrap::{build_components, build_components_with_client, Components};
pub use service::{JobStatusView, SummaryDefaults, SummaryService, SyncSummary};
