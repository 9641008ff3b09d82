//! Summarization primitives: request fingerprints, the process-wide upstream
//! throttle, and the adapter that turns a completion call into a
//! [`SummaryResult`].

pub mod adapter;
pub mod completion;
pub mod error;
pub mod fingerprint;
pub mod openrouter;
pub mod options;
pub mod text;
pub mod throttle;

pub use adapter::{Summarizer, SummarizerLimits};
pub use completion::{CompletionClient, CompletionError, CompletionRequest};
pub use error::SummarizeError;
pub use fingerprint::{fingerprint, CACHE_NAMESPACE};
pub use openrouter::{OpenRouterClient, OpenRouterConfig};
pub use options::{ParseStyleError, SummaryOptions, SummaryResult, SummaryStyle};
pub use throttle::{Cooling, ThrottleGuard, ThrottleStatus};
