//! API interaction layer: the backend contract, error classification, and usage tracking.
//!
//! These modules sit between the [`pipeline`](crate::pipeline) and the
//! text-generation backend:
//!
//! - [`client`]: the [`CompletionClient`] trait and its request/response types.
//! - [`retry`]: maps HTTP/API failures to [`CompletionError`](crate::error::CompletionError)
//!   variants and drives client-side exponential backoff for transient errors.
//! - [`tracing`]: request correlation IDs, per-model pricing tables, and the
//!   request-scoped [`CostTracker`].

pub mod client;
pub mod retry;
pub mod tracing;

// Re-export commonly used items at the module level.
pub use client::{Completion, CompletionClient, CompletionFuture, CompletionRequest};
pub use retry::RetryConfig;
pub use tracing::{CostTracker, generate_trace_id, pricing_for_model};
