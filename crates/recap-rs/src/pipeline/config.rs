//! Configuration for the summarization and chat pipelines.
//!
//! Every limit the pipeline uses lives here and is injected, so tests can run
//! with tiny fake budgets and deployments can tune thresholds per model.
//!
//! # Examples
//!
//! Defaults for a known model:
//!
//! ```ignore
//! let config = PipelineConfig::for_model("openai/gpt-4o-mini");
//! ```
//!
//! Tuned for a custom backend:
//!
//! ```ignore
//! let config = PipelineConfig::new("house-model", ModelProfile::new(32_000, 4_000, 10.0))
//!     .with_call_timeout(Duration::from_secs(30))
//!     .with_max_concurrency(3)
//!     .with_history_window(6);
//! ```

use crate::context::budget::{ModelProfile, TokenEstimator};
use crate::context::sampler::SamplerConfig;
use crate::context::window::{DEFAULT_EMERGENCY_HISTORY_WINDOW, DEFAULT_HISTORY_WINDOW};
use crate::DEFAULT_MODEL;
use std::time::Duration;

/// Summarization policy constants.
#[derive(Debug, Clone)]
pub struct SummaryPolicy {
    /// Tokens reserved for the summarization prompt wrapper. Default: 2000.
    pub prompt_overhead_tokens: usize,
    /// Up to this multiple of the usable budget, sample instead of chunking.
    /// Default: 2.0.
    pub sampling_ceiling_factor: f64,
    /// Per-chunk budget as a fraction of the usable budget. Default: 0.5.
    pub chunk_budget_fraction: f64,
    /// Fixed excerpt size for the emergency retry. Default: 4000.
    pub emergency_budget_tokens: usize,
    /// Output tokens for the DETAILED style. Default: 2000.
    pub detailed_output_tokens: u32,
    /// Output tokens for STANDARD and BULLET_POINTS. Default: 1200.
    pub standard_output_tokens: u32,
    /// Output tokens per chunk summary. Default: 800.
    pub chunk_output_tokens: u32,
    /// Default: 0.3.
    pub temperature: f32,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self {
            prompt_overhead_tokens: 2_000,
            sampling_ceiling_factor: 2.0,
            chunk_budget_fraction: 0.5,
            emergency_budget_tokens: 4_000,
            detailed_output_tokens: 2_000,
            standard_output_tokens: 1_200,
            chunk_output_tokens: 800,
            temperature: 0.3,
        }
    }
}

/// Chat policy constants.
#[derive(Debug, Clone)]
pub struct ChatPolicy {
    /// Fraction of the context window given to the transcript. Default: 0.70.
    pub transcript_fraction: f64,
    /// Tokens reserved for the chat system prompt wrapper. Default: 3000.
    pub prompt_overhead_tokens: usize,
    /// Most recent turns sent with each request. Default: 8.
    pub history_window: usize,
    /// Turns kept when rebuilding after an over-budget error. Default: 2.
    pub emergency_history_window: usize,
    /// Fixed transcript excerpt size for the emergency retry. Default: 2000.
    pub emergency_budget_tokens: usize,
    /// Default: 1000.
    pub max_output_tokens: u32,
    /// Default: 600.
    pub emergency_output_tokens: u32,
    /// Default: 0.7.
    pub temperature: f32,
}

impl Default for ChatPolicy {
    fn default() -> Self {
        Self {
            transcript_fraction: 0.70,
            prompt_overhead_tokens: 3_000,
            history_window: DEFAULT_HISTORY_WINDOW,
            emergency_history_window: DEFAULT_EMERGENCY_HISTORY_WINDOW,
            emergency_budget_tokens: 2_000,
            max_output_tokens: 1_000,
            emergency_output_tokens: 600,
            temperature: 0.7,
        }
    }
}

/// Everything the pipeline needs to know about its backend and policies.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Backend model identifier (used for logging and pricing).
    pub model: String,
    /// Capacity of the backend.
    pub profile: ModelProfile,
    pub estimator: TokenEstimator,
    pub sampler: SamplerConfig,
    pub summary: SummaryPolicy,
    pub chat: ChatPolicy,
    /// Per-call timeout. A timeout counts as a backend failure. Default: 60s.
    pub call_timeout: Duration,
    /// Maximum chunk summaries in flight at once. Default: 5.
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_model(DEFAULT_MODEL)
    }
}

impl PipelineConfig {
    /// Create a config with an explicit profile and default policies.
    pub fn new(model: impl Into<String>, profile: ModelProfile) -> Self {
        Self {
            model: model.into(),
            profile,
            estimator: TokenEstimator::default(),
            sampler: SamplerConfig::default(),
            summary: SummaryPolicy::default(),
            chat: ChatPolicy::default(),
            call_timeout: Duration::from_secs(60),
            max_concurrency: 5,
        }
    }

    /// Create a config using the built-in profile for `model`.
    pub fn for_model(model: impl Into<String>) -> Self {
        let model = model.into();
        let profile = ModelProfile::for_model(&model);
        Self::new(model, profile)
    }

    pub fn with_profile(mut self, profile: ModelProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the chunk concurrency cap. Zero is clamped to 1.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_sampling_ceiling_factor(mut self, factor: f64) -> Self {
        self.summary.sampling_ceiling_factor = factor;
        self
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.chat.history_window = turns;
        self
    }

    /// Usable input budget for summarization.
    pub fn summary_budget(&self) -> usize {
        self.profile
            .usable_input_budget(self.summary.prompt_overhead_tokens)
    }

    /// Per-chunk budget, always smaller than the usable budget.
    pub fn chunk_budget(&self) -> usize {
        let fraction = self.summary.chunk_budget_fraction.clamp(0.05, 0.95);
        ((self.summary_budget() as f64 * fraction).floor() as usize).max(1)
    }

    /// Transcript budget for chat: a smaller share of the window than
    /// summarization, leaving room for history and the user turn.
    pub fn chat_transcript_budget(&self) -> usize {
        self.profile
            .fraction_of_window(self.chat.transcript_fraction)
            .saturating_sub(self.chat.prompt_overhead_tokens)
            .min(self.summary_budget())
    }

    /// Check the profile, and that it leaves a non-zero input budget for
    /// both pipelines once prompt overhead is taken off.
    pub fn validate(&self) -> Result<(), String> {
        self.profile.validate()?;
        if self.summary_budget() == 0 {
            return Err(format!(
                "profile for '{}' leaves no summary budget: {} token window, {} reserved for output, {} of prompt overhead",
                self.model,
                self.profile.max_context_tokens,
                self.profile.reserved_output_tokens,
                self.summary.prompt_overhead_tokens
            ));
        }
        if self.chat_transcript_budget() == 0 {
            return Err(format!(
                "profile for '{}' leaves no chat transcript budget: {} token window, {} of prompt overhead",
                self.model, self.profile.max_context_tokens, self.chat.prompt_overhead_tokens
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budgets_for_gpt_4o_mini() {
        let config = PipelineConfig::default();
        // Margin and overhead leave 113_200, capped by the 16_384 output reserve.
        assert_eq!(config.summary_budget(), 111_616);
        assert_eq!(config.chat_transcript_budget(), 86_600);
        assert!(config.chunk_budget() < config.summary_budget());
    }

    #[test]
    fn chat_reserves_less_than_summary() {
        let config = PipelineConfig::for_model("anthropic/claude-sonnet-4");
        assert!(config.chat_transcript_budget() < config.summary_budget());
    }

    #[test]
    fn builders_override_defaults() {
        let config = PipelineConfig::new("tiny", ModelProfile::new(12_000, 1_500, 0.0))
            .with_call_timeout(Duration::from_secs(5))
            .with_max_concurrency(0)
            .with_history_window(4)
            .with_sampling_ceiling_factor(3.0);
        assert_eq!(config.summary_budget(), 10_000);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.chat.history_window, 4);
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!((config.summary.sampling_ceiling_factor - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn profile_without_input_budget_is_rejected() {
        let config = PipelineConfig::new("small", ModelProfile::new(2_048, 512, 10.0));
        assert_eq!(config.summary_budget(), 0);
        let err = config.validate().unwrap_err();
        assert!(err.contains("no summary budget"), "{err}");

        // Enough for summaries, but 70% of the window is eaten by chat overhead.
        let config = PipelineConfig::new("mid", ModelProfile::new(4_000, 500, 0.0));
        assert!(config.summary_budget() > 0);
        assert!(config.validate().unwrap_err().contains("no chat transcript budget"));

        assert!(PipelineConfig::default().validate().is_ok());
        assert!(
            PipelineConfig::new("test", ModelProfile::new(12_000, 1_500, 0.0))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn profile_and_estimator_can_be_swapped() {
        let config = PipelineConfig::for_model("openai/gpt-4o-mini")
            .with_profile(ModelProfile::new(12_000, 1_500, 0.0))
            .with_estimator(TokenEstimator::with_chars_per_token(4));
        assert_eq!(config.summary_budget(), 10_000);
        assert_eq!(config.estimator.estimate("abcdefgh"), 2);
    }
}
