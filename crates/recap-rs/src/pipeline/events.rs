//! Events and handlers for the summarization and chat pipelines.
//!
//! [`SummarizationPlanner`](super::summarize::SummarizationPlanner) and
//! [`ChatContextAssembler`](super::chat::ChatContextAssembler) report every
//! decision they make as a [`PipelineEvent`]: which strategy was picked, how
//! much was sampled away, which chunks failed, when the emergency path fired.
//! Callers implement [`EventHandler`] to observe these for logging, metrics,
//! or progress display.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget requests |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`EventObserver`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::context::BudgetUsage;
use crate::error::CompletionError;
use std::fmt;
use tracing::{debug, info, warn};

// ── Strategy ───────────────────────────────────────────────────────

/// How a summary was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyUsed {
    /// The full text fit the budget and was sent as-is.
    Direct,
    /// The text was sampled down to the budget, then sent as-is.
    Sampled,
    /// The text was split into chunks, each summarized, then combined.
    Chunked,
    /// The backend rejected a request as too long; a small excerpt was sent instead.
    Emergency,
}

impl StrategyUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyUsed::Direct => "direct",
            StrategyUsed::Sampled => "sampled",
            StrategyUsed::Chunked => "chunked",
            StrategyUsed::Emergency => "emergency",
        }
    }
}

impl fmt::Display for StrategyUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipeline stage an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Summary,
    ChunkSummary { index: usize },
    Combine,
    Chat,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Summary => f.write_str("summary"),
            Stage::ChunkSummary { index } => write!(f, "chunk {}", index + 1),
            Stage::Combine => f.write_str("combine"),
            Stage::Chat => f.write_str("chat"),
        }
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted while serving one summarize or chat request.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    /// The planner measured the source and picked a strategy.
    StrategySelected {
        strategy: StrategyUsed,
        usage: BudgetUsage,
    },
    /// The source (or chat transcript) was sampled down.
    Sampled {
        original_tokens: usize,
        sampled_tokens: usize,
    },
    /// The source was split for chunked summarization.
    ChunksPlanned { count: usize, chunk_budget: usize },
    /// One chunk summary came back.
    ChunkCompleted { index: usize, total: usize },
    /// One chunk summary failed and will be replaced by a placeholder.
    ChunkFailed {
        index: usize,
        total: usize,
        error: &'a CompletionError,
    },
    /// All chunk results are in; the combine call is about to be issued.
    CombineStarted { sections: usize },
    /// The backend returned nothing usable; the same call is being retried.
    MalformedRetry { stage: Stage },
    /// The backend reported a context-length error; retrying with a small excerpt.
    EmergencyFallback { stage: Stage, budget_tokens: usize },
    /// The chat history was cut down to the recency window.
    HistoryWindowed { kept: usize, dropped: usize },
    /// Token usage reported by the backend for one call.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Chat gave up and answered with a canned reply.
    ChatFallback { reason: &'a CompletionError },
    /// The request produced its final text.
    Finished {
        strategy: Option<StrategyUsed>,
        was_lossy: bool,
        backend_calls: usize,
    },
}

impl PipelineEvent<'_> {
    /// Total tokens from a `TokenUsage` event; `None` for all others.
    pub fn total_tokens(&self) -> Option<u64> {
        if let PipelineEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
        } = self
        {
            Some(*prompt_tokens as u64 + *completion_tokens as u64)
        } else {
            None
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────

/// Handler for pipeline events.
///
/// All events are informational; the default implementation ignores them.
///
/// ```ignore
/// struct Progress;
///
/// impl EventHandler for Progress {
///     fn on_event(&self, event: &PipelineEvent<'_>) {
///         if let PipelineEvent::ChunkCompleted { index, total } = event {
///             eprintln!("section {}/{} done", index + 1, total);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// Adapts a closure into an [`EventHandler`].
///
/// ```ignore
/// let handler = EventObserver::new(|event| {
///     if let PipelineEvent::Finished { was_lossy: true, .. } = event {
///         eprintln!("summary is partial");
///     }
/// });
/// ```
pub struct EventObserver<F>(F)
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync;

impl<F> EventObserver<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for EventObserver<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent<'_>) {
        (self.0)(event);
    }
}

/// Dispatches each event to several handlers in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(show_progress, progress_handler);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::StrategySelected { strategy, usage } => {
                info!("Strategy {strategy}: {}", usage.to_log_string());
            }
            PipelineEvent::Sampled {
                original_tokens,
                sampled_tokens,
            } => {
                debug!("Sampled ~{original_tokens} tokens down to ~{sampled_tokens}");
            }
            PipelineEvent::ChunksPlanned {
                count,
                chunk_budget,
            } => {
                info!("Split into {count} chunk(s) of at most ~{chunk_budget} tokens");
            }
            PipelineEvent::ChunkCompleted { index, total } => {
                debug!("Chunk {}/{total} summarized", index + 1);
            }
            PipelineEvent::ChunkFailed {
                index,
                total,
                error,
            } => {
                warn!("Chunk {}/{total} failed, using placeholder: {error}", index + 1);
            }
            PipelineEvent::CombineStarted { sections } => {
                debug!("Combining {sections} section summaries");
            }
            PipelineEvent::MalformedRetry { stage } => {
                warn!("Empty completion at {stage} stage, retrying once");
            }
            PipelineEvent::EmergencyFallback {
                stage,
                budget_tokens,
            } => {
                warn!("Context length exceeded at {stage} stage, retrying with ~{budget_tokens} token excerpt");
            }
            PipelineEvent::HistoryWindowed { kept, dropped } => {
                if *dropped > 0 {
                    debug!("History window: kept {kept} turn(s), dropped {dropped}");
                }
            }
            PipelineEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!(
                    "Tokens: prompt={prompt_tokens}, completion={completion_tokens}, total={}",
                    event.total_tokens().unwrap_or_default()
                );
            }
            PipelineEvent::ChatFallback { reason } => {
                warn!("Chat answered with canned reply: {reason}");
            }
            PipelineEvent::Finished {
                strategy,
                was_lossy,
                backend_calls,
            } => {
                let strategy = strategy.map_or("chat", |s| s.as_str());
                info!("Finished ({strategy}, lossy={was_lossy}, {backend_calls} backend call(s))");
            }
        }
    }
}
