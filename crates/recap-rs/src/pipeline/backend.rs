//! Request-scoped wrapper around a [`CompletionClient`].
//!
//! Every backend call made while serving one request goes through a
//! [`BackendCall`], which applies the per-call timeout, refuses requests that
//! cannot fit the context window, retries an empty completion once, and
//! accumulates usage for the request.

use super::events::{EventHandler, PipelineEvent, Stage};
use crate::api::client::{CompletionClient, CompletionRequest};
use crate::api::tracing::{CostTracker, ModelPricing, pricing_for_model};
use crate::context::budget::{BudgetUsage, ModelProfile, TokenEstimator, over_budget_error};
use crate::error::CompletionError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub(crate) struct BackendCall<'a> {
    client: &'a dyn CompletionClient,
    events: &'a dyn EventHandler,
    profile: &'a ModelProfile,
    estimator: TokenEstimator,
    timeout: Duration,
    pricing: ModelPricing,
    usage: Mutex<CostTracker>,
    calls: AtomicUsize,
}

impl<'a> BackendCall<'a> {
    pub(crate) fn new(
        client: &'a dyn CompletionClient,
        events: &'a dyn EventHandler,
        model: &str,
        profile: &'a ModelProfile,
        estimator: TokenEstimator,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            events,
            profile,
            estimator,
            timeout,
            pricing: pricing_for_model(model),
            usage: Mutex::new(CostTracker::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Issue `request`, retrying once at the same stage if the completion is empty.
    pub(crate) async fn complete(
        &self,
        stage: Stage,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        match self.attempt(stage, request).await {
            Err(err) if err.is_malformed() => {
                self.events
                    .on_event(&PipelineEvent::MalformedRetry { stage });
                self.attempt(stage, request).await
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        stage: Stage,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let input_tokens = self.estimator.estimate_len(request.content_len());
        let window = BudgetUsage::new(
            input_tokens + request.max_output_tokens as usize,
            self.profile.max_context_tokens,
        );
        if !window.fits() {
            debug!("[{stage}] refusing request locally: {}", window.to_log_string());
            return Err(over_budget_error(window));
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        debug!(
            "[{stage}] calling backend: ~{input_tokens} input tokens, max_output={}",
            request.max_output_tokens
        );

        let completion = tokio::time::timeout(self.timeout, self.client.complete(request))
            .await
            .map_err(|_| CompletionError::Timeout(self.timeout))??;

        if let Some(usage) = &completion.usage {
            self.events.on_event(&PipelineEvent::TokenUsage {
                prompt_tokens: usage.prompt_tokens.unwrap_or(0),
                completion_tokens: usage.completion_tokens.unwrap_or(0),
            });
        }
        if let Ok(mut tracker) = self.usage.lock() {
            tracker.record_usage(completion.usage.as_ref(), &self.pricing);
        }

        completion.into_text()
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Usage accumulated so far.
    pub(crate) fn usage(&self) -> CostTracker {
        self.usage
            .lock()
            .map(|tracker| tracker.clone())
            .unwrap_or_default()
    }
}
