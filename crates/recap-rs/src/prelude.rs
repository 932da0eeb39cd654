//! Convenience re-exports for common `recap-rs` types.
//!
//! ```ignore
//! use recap_rs::prelude::*;
//! ```
//!
//! Pulls in the backend client, the two pipeline entry points with their
//! config and results, event handlers, and the transcript types. Lower-level
//! pieces (sampler, chunker, retry classification) stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, OpenRouterClient};

// ── Backend contract ────────────────────────────────────────────────
pub use crate::api::{
    Completion, CompletionClient, CompletionFuture, CompletionRequest, CostTracker, RetryConfig,
};
pub use crate::error::{CompletionError, SummarizeError};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::pipeline::{
    ChatContextAssembler, ChatFallback, ChatResult, CompositeEventHandler, EventHandler,
    EventObserver, LoggingHandler, NoopHandler, PipelineConfig, PipelineEvent,
    SummarizationPlanner, SummaryResult, SummaryStyle, StrategyUsed,
};

// ── Context and transcripts ─────────────────────────────────────────
pub use crate::context::{ChatHistory, ChatTurn, ModelProfile, TokenEstimator};
pub use crate::transcript::{Segment, SourceText, TranscriptStats};
