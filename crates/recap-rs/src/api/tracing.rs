//! Correlation IDs and usage/cost tracking for pipeline requests.
//!
//! Every summarize or chat request gets a `trace_id` that tags its tracing
//! span. Token usage reported by each backend call is accumulated into a
//! request-scoped [`CostTracker`].

use crate::UsageInfo;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique trace ID for a pipeline request.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("rq-{ts:x}-{count:04x}")
}

/// Per-model pricing for cost estimation (USD per 1M tokens).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Estimate cost for given token counts.
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

/// Lookup approximate pricing for a model by name.
///
/// Matches on the segment after the last `/` so org prefixes don't cause
/// false positives.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    // Approximate. Cost tracking is for spotting runaway chunking, not billing.
    if name.contains("gpt-4o-mini") || name.contains("4o-mini") {
        ModelPricing {
            input_per_million: 0.15,
            output_per_million: 0.60,
        }
    } else if name.contains("gpt-4o") || name.contains("gpt-4") {
        ModelPricing {
            input_per_million: 2.50,
            output_per_million: 10.0,
        }
    } else if name.contains("gpt-3.5") {
        ModelPricing {
            input_per_million: 0.50,
            output_per_million: 1.50,
        }
    } else if name.contains("haiku") {
        ModelPricing {
            input_per_million: 0.25,
            output_per_million: 1.25,
        }
    } else if name.contains("sonnet") {
        ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    } else if name.contains("gemini") && name.contains("flash") {
        ModelPricing {
            input_per_million: 0.075,
            output_per_million: 0.30,
        }
    } else {
        ModelPricing::default()
    }
}

/// Cumulative usage for one pipeline request (all backend calls).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CostTracker {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record token usage for one call.
    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32, pricing: &ModelPricing) {
        self.total_prompt_tokens += prompt_tokens as u64;
        self.total_completion_tokens += completion_tokens as u64;
        self.estimated_cost_usd += pricing.estimate_cost(prompt_tokens, completion_tokens);
    }

    /// Record a backend-reported usage block, if any.
    pub fn record_usage(&mut self, usage: Option<&UsageInfo>, pricing: &ModelPricing) {
        if let Some(u) = usage {
            self.record(
                u.prompt_tokens.unwrap_or(0),
                u.completion_tokens.unwrap_or(0),
                pricing,
            );
        }
    }

    /// Total tokens consumed.
    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        format!(
            "tokens: {} prompt + {} completion = {} total, est. cost: ${:.4}",
            self.total_prompt_tokens,
            self.total_completion_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_unique() {
        let id1 = generate_trace_id();
        let id2 = generate_trace_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("rq-"));
    }

    #[test]
    fn cost_estimation() {
        let pricing = ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
        };
        let cost = pricing.estimate_cost(1_000_000, 100_000);
        assert!((cost - 4.5).abs() < 0.01);
    }

    #[test]
    fn cost_tracker_accumulates() {
        let mut tracker = CostTracker::new();
        let pricing = ModelPricing::default();
        tracker.record(1000, 500, &pricing);
        tracker.record_usage(
            Some(&UsageInfo {
                prompt_tokens: Some(2000),
                completion_tokens: Some(1000),
                total_tokens: Some(3000),
            }),
            &pricing,
        );
        tracker.record_usage(None, &pricing);
        assert_eq!(tracker.total_prompt_tokens, 3000);
        assert_eq!(tracker.total_completion_tokens, 1500);
        assert!(tracker.summary().contains("4500 total"));
    }

    #[test]
    fn pricing_lookup_known_models() {
        let mini = pricing_for_model("openai/gpt-4o-mini");
        assert!(mini.input_per_million < 1.0);

        let gpt4o = pricing_for_model("openai/gpt-4o");
        assert!(gpt4o.input_per_million > mini.input_per_million);

        let unknown = pricing_for_model("acme/house-model");
        assert_eq!(unknown, ModelPricing::default());
    }
}
