//! Error types for completion backends and the summarization pipeline.
//!
//! Two layers:
//!
//! - [`CompletionError`]: what a [`CompletionClient`](crate::api::client::CompletionClient)
//!   reports for a single call. The pipeline branches on the variant: only
//!   [`CompletionError::ContextLengthExceeded`] drives the emergency
//!   truncation path; everything else propagates.
//! - [`SummarizeError`]: what [`SummarizationPlanner::summarize`](crate::pipeline::summarize::SummarizationPlanner::summarize)
//!   surfaces to its caller. Messages are stable so they can be shown to end
//!   users as-is.
//!
//! Chat never returns an error; see [`ChatFallback`](crate::pipeline::chat::ChatFallback).

use std::time::Duration;
use thiserror::Error;

/// Failure of a single completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Combined input + output exceeded the model's context window.
    #[error("context length exceeded: {0}")]
    ContextLengthExceeded(String),
    /// Transient backend failure (rate limit, 5xx, network).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The call did not finish within the per-call timeout.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    /// The backend refused the request (bad request, auth).
    #[error("backend rejected request: {0}")]
    Rejected(String),
    /// The backend answered, but with nothing usable.
    #[error("malformed completion: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// Whether this error should trigger the truncation fallback.
    pub fn is_context_length(&self) -> bool {
        matches!(self, CompletionError::ContextLengthExceeded(_))
    }

    /// Whether the caller may retry the same request later.
    ///
    /// Timeouts count as transient backend failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::BackendUnavailable(_) | CompletionError::Timeout(_)
        )
    }

    /// Whether this is an empty or unusable completion.
    pub fn is_malformed(&self) -> bool {
        matches!(self, CompletionError::Malformed(_))
    }
}

/// Failure of a summarization request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizeError {
    /// The source text was empty or whitespace only.
    #[error("Transcript is empty")]
    EmptyTranscript,
    /// The backend rejected even the emergency excerpt.
    #[error("Transcript too long to process")]
    TooLong(#[source] CompletionError),
    /// Transient backend failure. Safe to retry later.
    #[error("Summarization service temporarily unavailable")]
    BackendUnavailable(#[source] CompletionError),
    /// Any other terminal failure.
    #[error("Failed to generate summary")]
    Failed(#[source] CompletionError),
}

impl SummarizeError {
    /// Classify a terminal completion failure.
    pub(crate) fn from_completion(err: CompletionError) -> Self {
        if err.is_context_length() {
            SummarizeError::TooLong(err)
        } else if err.is_retryable() {
            SummarizeError::BackendUnavailable(err)
        } else {
            SummarizeError::Failed(err)
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SummarizeError::BackendUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        assert!(CompletionError::ContextLengthExceeded("x".into()).is_context_length());
        assert!(CompletionError::BackendUnavailable("x".into()).is_retryable());
        assert!(CompletionError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!CompletionError::Rejected("x".into()).is_retryable());
        assert!(CompletionError::Malformed("empty".into()).is_malformed());
    }

    #[test]
    fn summarize_error_messages_are_stable() {
        let err = SummarizeError::from_completion(CompletionError::ContextLengthExceeded(
            "too big".into(),
        ));
        assert_eq!(err.to_string(), "Transcript too long to process");

        let err = SummarizeError::from_completion(CompletionError::Malformed("empty".into()));
        assert_eq!(err.to_string(), "Failed to generate summary");
        assert!(!err.is_retryable());
    }

    #[test]
    fn unavailable_maps_to_retryable() {
        let err = SummarizeError::from_completion(CompletionError::Timeout(Duration::from_secs(60)));
        assert!(matches!(err, SummarizeError::BackendUnavailable(_)));
        assert!(err.is_retryable());
    }
}
