//! Error classification and client-side retry with exponential backoff.
//!
//! [`classify_http_error`] maps a failed backend response onto a
//! [`CompletionError`] variant. Context-length failures are recognised first
//! (they arrive as HTTP 400 but must not be treated as generic rejections).
//! Transient errors (429, 5xx, network timeouts) are retried by
//! [`OpenRouterClient`](crate::OpenRouterClient) according to [`RetryConfig`];
//! nothing else is retried at this layer.

use crate::error::CompletionError;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries. Uses sensible defaults.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Whether an error body reports an over-budget request.
pub fn is_context_length_error(body: &str) -> bool {
    let lower = body.to_lowercase();
    [
        "context_length_exceeded",
        "maximum context length",
        "context length",
        "context window",
        "too many tokens",
        "prompt is too long",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Whether an HTTP status is a transient (retryable) failure.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Whether a transport-level error message indicates a transient failure.
pub fn is_transient_transport_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    [
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
        "network",
        "dns",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Map a failed HTTP response onto a [`CompletionError`].
pub fn classify_http_error(status: u16, body: &str) -> CompletionError {
    if is_context_length_error(body) {
        CompletionError::ContextLengthExceeded(format!("HTTP {status}: {body}"))
    } else if is_transient_status(status) {
        CompletionError::BackendUnavailable(format!("HTTP {status}: {body}"))
    } else {
        CompletionError::Rejected(format!("HTTP {status}: {body}"))
    }
}

/// Map an error embedded in a 200 response body onto a [`CompletionError`].
pub fn classify_api_error(code: Option<&str>, message: &str) -> CompletionError {
    if code == Some("context_length_exceeded") || is_context_length_error(message) {
        CompletionError::ContextLengthExceeded(message.to_string())
    } else if is_transient_transport_error(message)
        || code.is_some_and(|c| {
            c.contains("rate_limit")
                || c.contains("server_error")
                || c.parse::<u16>().is_ok_and(is_transient_status)
        })
    {
        CompletionError::BackendUnavailable(message.to_string())
    } else {
        CompletionError::Rejected(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_no_retries() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn with_retries_sets_count() {
        let config = RetryConfig::with_retries(3);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn context_length_wins_over_status() {
        let err = classify_http_error(
            400,
            r#"{"error":{"code":"context_length_exceeded","message":"This model's maximum context length is 16385 tokens"}}"#,
        );
        assert!(err.is_context_length());
    }

    #[test]
    fn transient_statuses_are_unavailable() {
        assert!(classify_http_error(429, "rate limited").is_retryable());
        assert!(classify_http_error(503, "overloaded").is_retryable());
    }

    #[test]
    fn auth_errors_are_rejected() {
        let err = classify_http_error(401, "invalid api key");
        assert!(matches!(err, CompletionError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn embedded_api_errors() {
        assert!(classify_api_error(Some("context_length_exceeded"), "too long").is_context_length());
        assert!(classify_api_error(None, "upstream timed out").is_retryable());
        assert!(classify_api_error(Some("429"), "slow down").is_retryable());
        assert!(matches!(
            classify_api_error(None, "model not found"),
            CompletionError::Rejected(_)
        ));
    }

    #[test]
    fn transport_errors_detected() {
        assert!(is_transient_transport_error("error sending request: connection reset"));
        assert!(!is_transient_transport_error("some random error"));
    }
}
