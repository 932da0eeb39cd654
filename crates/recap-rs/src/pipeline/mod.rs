//! The summarization and chat pipelines.
//!
//! Both entry points take a source text, fit it into the backend's context
//! budget, and degrade instead of failing when it does not fit:
//!
//! - [`SummarizationPlanner`] picks a direct, sampled, or chunked strategy and
//!   falls back to a small excerpt on a context-length error.
//! - [`ChatContextAssembler`] sends a bounded transcript excerpt plus a recency
//!   window of history, and always produces a reply.
//!
//! Supporting modules:
//!
//! - [`config`]: injected budgets and policy constants.
//! - [`events`]: [`PipelineEvent`] and the [`EventHandler`] trait.
//! - [`style`]: summary styles, prompts, and lossy disclaimers.

mod backend;
pub mod chat;
pub mod config;
pub mod events;
pub mod style;
pub mod summarize;

pub use chat::{ChatContextAssembler, ChatFallback, ChatResult};
pub use config::{ChatPolicy, PipelineConfig, SummaryPolicy};
pub use events::{
    CompositeEventHandler, EventHandler, EventObserver, LoggingHandler, NoopHandler,
    PipelineEvent, Stage, StrategyUsed,
};
pub use style::{StyleRenderer, SummaryStyle};
pub use summarize::{SummarizationPlanner, SummaryResult};
