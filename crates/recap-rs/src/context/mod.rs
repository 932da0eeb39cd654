//! Context window management: estimation, budgets, sampling, chunking, history.
//!
//! The context window is the one hard limit every request must respect. This
//! module provides the building blocks the [`pipeline`](crate::pipeline) uses
//! to stay inside it:
//!
//! 1. **[`budget`]**: [`TokenEstimator`] (always-overestimating token count)
//!    and [`ModelProfile`] (per-backend capacity and usable input budget).
//!
//! 2. **[`sampler`]**: [`TextSampler`] reduces oversized text to a
//!    representative excerpt: head, strided middle, tail.
//!
//! 3. **[`chunker`]**: [`Chunker`] splits text into ordered,
//!    sentence-bounded chunks for divide-and-combine summarization.
//!
//! 4. **[`window`]**: [`HistoryWindow`] keeps the most recent chat turns.

pub mod budget;
pub mod chunker;
pub mod sampler;
pub mod window;

// Re-export commonly used items at the module level.
pub use budget::{
    BudgetUsage, DEFAULT_CHARS_PER_TOKEN, ModelProfile, TokenEstimator, estimate_tokens,
    load_profiles,
};
pub use chunker::{Chunker, split_sentences};
pub use sampler::{Sampled, SamplerConfig, TextSampler, has_elision_marker};
pub use window::{ChatHistory, ChatTurn, HistoryWindow, TurnRole, session_title};
