//! Token estimation and per-model context budgets.
//!
//! Token counts are approximate. [`TokenEstimator`] divides the byte length
//! of the text by a fixed characters-per-token ratio and rounds up, so it
//! never reports fewer tokens than a real tokenizer would for typical text.
//!
//! [`ModelProfile`] describes one backend's capacity. Profiles come from the
//! built-in table ([`ModelProfile::for_model`]) or from a JSON file
//! ([`load_profiles`]); the pipeline never hardcodes limits.

use crate::error::CompletionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default characters per token. Deliberately lower than the 3.5-4 most
/// tokenizers average for English so estimates stay on the high side.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 3;

/// Default context window for unknown models.
const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Approximate token counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator {
    /// Create an estimator with a custom ratio. A ratio of zero is clamped to 1.
    pub fn with_chars_per_token(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    /// Estimated tokens for `text`: `ceil(bytes / chars_per_token)`.
    ///
    /// Uses byte length, which is never smaller than the character count,
    /// so multi-byte scripts are overestimated rather than underestimated.
    pub fn estimate(&self, text: &str) -> usize {
        self.estimate_len(text.len())
    }

    /// Estimated tokens for `len` bytes of text.
    pub fn estimate_len(&self, len: usize) -> usize {
        len.div_ceil(self.chars_per_token)
    }

    /// Inverse of [`estimate`](Self::estimate): bytes that fit in `tokens`.
    pub fn chars_for(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.chars_per_token)
    }
}

/// Estimate tokens with the default ratio.
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::default().estimate(text)
}

/// Capacity of one text-generation backend.
///
/// Invariant (checked by [`validate`](Self::validate)): the reserved output
/// plus any input budget derived from this profile never exceeds
/// `max_context_tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Maximum combined input + output tokens per call.
    pub max_context_tokens: usize,
    /// Tokens held back for the model's response.
    pub reserved_output_tokens: usize,
    /// Fraction of the window (in percent) kept free to absorb estimation error.
    pub safety_margin_percent: f64,
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            max_context_tokens: DEFAULT_CONTEXT_WINDOW,
            reserved_output_tokens: 16_384,
            safety_margin_percent: 10.0,
        }
    }
}

impl ModelProfile {
    pub fn new(
        max_context_tokens: usize,
        reserved_output_tokens: usize,
        safety_margin_percent: f64,
    ) -> Self {
        Self {
            max_context_tokens,
            reserved_output_tokens,
            safety_margin_percent,
        }
    }

    /// Built-in profile for a model identifier.
    ///
    /// Matches on the model name segment (after the last `/` in ids like
    /// `"openai/gpt-4o-mini"`), falling back to [`ModelProfile::default`].
    pub fn for_model(model: &str) -> Self {
        let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

        if name.contains("gpt-4o") || name.contains("gpt-4-turbo") {
            Self::new(128_000, 16_384, 10.0)
        } else if name.contains("gpt-3.5") {
            Self::new(16_385, 4_096, 10.0)
        } else if name.contains("gpt-4") {
            Self::new(32_768, 4_096, 10.0)
        } else if name.contains("claude") {
            Self::new(200_000, 8_192, 10.0)
        } else if name.contains("gemini") {
            Self::new(1_000_000, 8_192, 10.0)
        } else {
            Self::default()
        }
    }

    /// Check the profile is internally consistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_context_tokens == 0 {
            return Err("max_context_tokens must be positive".into());
        }
        if !(0.0..100.0).contains(&self.safety_margin_percent) {
            return Err(format!(
                "safety_margin_percent must be in [0, 100), got {}",
                self.safety_margin_percent
            ));
        }
        if self.reserved_output_tokens >= self.max_context_tokens {
            return Err(format!(
                "reserved_output_tokens ({}) must be smaller than max_context_tokens ({})",
                self.reserved_output_tokens, self.max_context_tokens
            ));
        }
        Ok(())
    }

    /// `floor(max_context_tokens × fraction)`.
    pub fn fraction_of_window(&self, fraction: f64) -> usize {
        (self.max_context_tokens as f64 * fraction).floor() as usize
    }

    /// Input budget after the safety margin and a fixed prompt overhead.
    ///
    /// `floor(max × (100 − margin) / 100) − overhead`, additionally capped at
    /// `max − reserved_output` so the reserved output always fits.
    pub fn usable_input_budget(&self, prompt_overhead: usize) -> usize {
        let after_margin = self.fraction_of_window((100.0 - self.safety_margin_percent) / 100.0);
        after_margin
            .saturating_sub(prompt_overhead)
            .min(self.max_input_tokens())
    }

    /// Largest input that leaves room for the reserved output.
    pub fn max_input_tokens(&self) -> usize {
        self.max_context_tokens
            .saturating_sub(self.reserved_output_tokens)
    }

    /// Cap a requested output length by the reserved output budget.
    pub fn cap_output(&self, requested: u32) -> u32 {
        let reserved = u32::try_from(self.reserved_output_tokens).unwrap_or(u32::MAX);
        requested.min(reserved).max(1)
    }
}

/// Load a map of model id → profile from a JSON file.
///
/// ```json
/// { "openai/gpt-4o-mini": { "max_context_tokens": 128000,
///                           "reserved_output_tokens": 16384,
///                           "safety_margin_percent": 10 } }
/// ```
pub fn load_profiles(path: &Path) -> Result<HashMap<String, ModelProfile>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read profile file '{}': {e}", path.display()))?;
    let profiles: HashMap<String, ModelProfile> = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse profile file '{}': {e}", path.display()))?;
    for (model, profile) in &profiles {
        profile
            .validate()
            .map_err(|e| format!("invalid profile for '{model}': {e}"))?;
    }
    Ok(profiles)
}

/// Snapshot of how much of a budget a piece of text occupies.
#[derive(Debug, Clone, Copy)]
pub struct BudgetUsage {
    /// Estimated tokens of the text.
    pub estimated_tokens: usize,
    /// Budget it was measured against.
    pub budget_tokens: usize,
}

impl BudgetUsage {
    pub fn new(estimated_tokens: usize, budget_tokens: usize) -> Self {
        Self {
            estimated_tokens,
            budget_tokens,
        }
    }

    /// Usage as a fraction (0.0 to 1.0+). A zero budget counts as full.
    pub fn usage_pct(&self) -> f64 {
        if self.budget_tokens > 0 {
            self.estimated_tokens as f64 / self.budget_tokens as f64
        } else {
            1.0
        }
    }

    pub fn fits(&self) -> bool {
        self.estimated_tokens <= self.budget_tokens
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "~{} tokens ({:.0}% of {} budget)",
            self.estimated_tokens,
            self.usage_pct() * 100.0,
            self.budget_tokens,
        )
    }
}

/// Context-length error for a request that cannot fit the window, raised
/// locally so the backend is never called with it.
pub(crate) fn over_budget_error(usage: BudgetUsage) -> CompletionError {
    CompletionError::ContextLengthExceeded(format!(
        "request needs {} but only {} fit",
        usage.estimated_tokens, usage.budget_tokens
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
    }

    #[test]
    fn estimate_is_monotonic_in_length() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let mut last = 0;
        for end in 0..=text.len() {
            let n = estimate_tokens(&text[..end]);
            assert!(n >= last, "estimate dropped at {end}");
            last = n;
        }
    }

    #[test]
    fn appending_never_decreases_estimate() {
        let a = "hello world";
        for b in ["x", " and more", "ünïcödé"] {
            assert!(estimate_tokens(&format!("{a}{b}")) >= estimate_tokens(a));
        }
    }

    #[test]
    fn multibyte_text_is_overestimated() {
        // 4 characters, 12 bytes.
        let text = "日本語字";
        assert_eq!(estimate_tokens(text), 4);
        assert!(estimate_tokens(text) >= text.chars().count().div_ceil(3));
    }

    #[test]
    fn zero_ratio_is_clamped() {
        let est = TokenEstimator::with_chars_per_token(0);
        assert_eq!(est.chars_per_token(), 1);
        assert_eq!(est.estimate("abcd"), 4);
    }

    #[test]
    fn usable_budget_applies_margin_and_overhead() {
        let profile = ModelProfile::new(128_000, 8_192, 10.0);
        assert_eq!(profile.usable_input_budget(2_000), 113_200);
    }

    #[test]
    fn usable_budget_leaves_room_for_output() {
        let profile = ModelProfile::new(10_000, 5_000, 0.0);
        let usable = profile.usable_input_budget(0);
        assert_eq!(usable, 5_000);
        assert!(usable + profile.reserved_output_tokens <= profile.max_context_tokens);
    }

    #[test]
    fn usable_budget_saturates() {
        let profile = ModelProfile::new(1_000, 100, 10.0);
        assert_eq!(profile.usable_input_budget(5_000), 0);
    }

    #[test]
    fn known_models_have_profiles() {
        assert_eq!(
            ModelProfile::for_model("openai/gpt-4o-mini").max_context_tokens,
            128_000
        );
        assert_eq!(
            ModelProfile::for_model("gpt-3.5-turbo").max_context_tokens,
            16_385
        );
        assert_eq!(
            ModelProfile::for_model("anthropic/claude-sonnet-4").max_context_tokens,
            200_000
        );
        assert_eq!(
            ModelProfile::for_model("some/unknown"),
            ModelProfile::default()
        );
    }

    #[test]
    fn validate_rejects_inconsistent_profiles() {
        assert!(ModelProfile::default().validate().is_ok());
        assert!(ModelProfile::new(0, 0, 10.0).validate().is_err());
        assert!(ModelProfile::new(1_000, 1_000, 10.0).validate().is_err());
        assert!(ModelProfile::new(1_000, 100, 100.0).validate().is_err());
    }

    #[test]
    fn cap_output_respects_reserve() {
        let profile = ModelProfile::new(10_000, 500, 10.0);
        assert_eq!(profile.cap_output(2_000), 500);
        assert_eq!(profile.cap_output(300), 300);
    }

    #[test]
    fn load_profiles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"{"tiny": {"max_context_tokens": 4000, "reserved_output_tokens": 500, "safety_margin_percent": 5}}"#,
        )
        .unwrap();
        let profiles = load_profiles(&path).unwrap();
        assert_eq!(profiles["tiny"].max_context_tokens, 4_000);
    }

    #[test]
    fn load_profiles_rejects_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"{"bad": {"max_context_tokens": 100, "reserved_output_tokens": 500, "safety_margin_percent": 5}}"#,
        )
        .unwrap();
        let err = load_profiles(&path).unwrap_err();
        assert!(err.contains("bad"));
    }

    #[test]
    fn budget_usage_log_string() {
        let usage = BudgetUsage::new(500, 1_000);
        assert!(usage.fits());
        assert!(usage.to_log_string().contains("50%"));
        assert!(!BudgetUsage::new(1, 0).fits());
    }
}
