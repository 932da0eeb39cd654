//! Budget-aware summarization.
//!
//! [`SummarizationPlanner`] measures the source text against the usable
//! input budget and picks one of three strategies:
//!
//! 1. **Direct**: the text fits, so it is summarized in one call.
//! 2. **Sampled**: the text is at most `sampling_ceiling_factor` times the
//!    budget. It is sampled down to the budget (head, strided middle, tail)
//!    and then summarized in one call. The result is lossy.
//! 3. **Chunked**: anything larger is split into sentence-bounded chunks.
//!    Each chunk is summarized on its own (concurrently, bounded by
//!    `max_concurrency`), and one final call combines the section summaries
//!    in original order. A failed chunk becomes a placeholder; the request
//!    only fails if every chunk fails.
//!
//! If the backend reports a context-length error at any point, the planner
//! takes the emergency edge exactly once: it samples the source down to a
//! small fixed budget and retries a single-pass summary. Other failures are
//! never downgraded; they surface as [`SummarizeError`].

use super::backend::BackendCall;
use super::config::PipelineConfig;
use super::events::{EventHandler, NoopHandler, PipelineEvent, Stage, StrategyUsed};
use super::style::{
    CHUNK_SYSTEM_PROMPT, COMBINE_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT, StyleRenderer,
    SummaryStyle,
};
use crate::api::client::{CompletionClient, CompletionRequest};
use crate::api::tracing::{CostTracker, generate_trace_id};
use crate::context::budget::BudgetUsage;
use crate::context::chunker::Chunker;
use crate::context::sampler::TextSampler;
use crate::error::{CompletionError, SummarizeError};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{Instrument, debug, info_span, warn};

/// A failed backend call and the stage it failed at.
type StageResult<T> = Result<T, (Stage, CompletionError)>;

/// Outcome of a successful summarization.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    /// Final summary, with a disclaimer appended when `was_lossy`.
    pub text: String,
    pub strategy: StrategyUsed,
    /// Whether any of the source was left out of what the backend saw.
    pub was_lossy: bool,
    pub style: SummaryStyle,
    pub trace_id: String,
    /// Usage summed over every backend call of this request.
    pub usage: CostTracker,
    pub backend_calls: usize,
}

/// Chooses and runs a summarization strategy for one source text.
///
/// ```ignore
/// let client = OpenRouterClient::new(api_key)?;
/// let planner = SummarizationPlanner::new(&client, PipelineConfig::default())
///     .with_event_handler(&LoggingHandler);
/// let result = planner.summarize(&transcript, SummaryStyle::BulletPoints).await?;
/// println!("{} ({})", result.text, result.strategy);
/// ```
pub struct SummarizationPlanner<'a> {
    client: &'a dyn CompletionClient,
    config: PipelineConfig,
    events: &'a dyn EventHandler,
}

impl<'a> SummarizationPlanner<'a> {
    pub fn new(client: &'a dyn CompletionClient, config: PipelineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Summarizing with an unusable config: {e}");
        }
        Self {
            client,
            config,
            events: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, events: &'a dyn EventHandler) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Strategy the planner would pick for a text of `estimated_tokens`.
    pub fn select_strategy(&self, estimated_tokens: usize) -> StrategyUsed {
        let budget = self.config.summary_budget();
        let ceiling =
            (budget as f64 * self.config.summary.sampling_ceiling_factor.max(1.0)).floor() as usize;
        if estimated_tokens <= budget {
            StrategyUsed::Direct
        } else if estimated_tokens <= ceiling {
            StrategyUsed::Sampled
        } else {
            StrategyUsed::Chunked
        }
    }

    /// Summarize `source` in `style`.
    pub async fn summarize(
        &self,
        source: &str,
        style: SummaryStyle,
    ) -> Result<SummaryResult, SummarizeError> {
        let trace_id = generate_trace_id();
        let span = info_span!(
            "summarize",
            trace_id = %trace_id,
            model = %self.config.model,
            style = %style,
        );
        self.run(source, style, trace_id).instrument(span).await
    }

    async fn run(
        &self,
        source: &str,
        style: SummaryStyle,
        trace_id: String,
    ) -> Result<SummaryResult, SummarizeError> {
        if source.trim().is_empty() {
            return Err(SummarizeError::EmptyTranscript);
        }

        let backend = BackendCall::new(
            self.client,
            self.events,
            &self.config.model,
            &self.config.profile,
            self.config.estimator,
            self.config.call_timeout,
        );

        let budget = self.config.summary_budget();
        let estimated = self.config.estimator.estimate(source);
        let strategy = self.select_strategy(estimated);
        self.events.on_event(&PipelineEvent::StrategySelected {
            strategy,
            usage: BudgetUsage::new(estimated, budget),
        });

        let attempt = match strategy {
            StrategyUsed::Chunked => self.chunked(&backend, source, style).await,
            StrategyUsed::Sampled => {
                let sampled = self.sampler().sample(source, budget);
                self.events.on_event(&PipelineEvent::Sampled {
                    original_tokens: estimated,
                    sampled_tokens: self.config.estimator.estimate(&sampled.text),
                });
                self.single_pass(&backend, &sampled.text, style)
                    .await
                    .map(|text| (text, sampled.was_truncated))
                    .map_err(|err| (Stage::Summary, err))
            }
            StrategyUsed::Direct | StrategyUsed::Emergency => self
                .single_pass(&backend, source, style)
                .await
                .map(|text| (text, false))
                .map_err(|err| (Stage::Summary, err)),
        };

        let (text, strategy, was_lossy) = match attempt {
            Ok((text, was_lossy)) => (text, strategy, was_lossy),
            Err((stage, err)) if err.is_context_length() => {
                debug!("{strategy} strategy hit the context limit at {stage}: {err}");
                let text = self
                    .emergency(&backend, source, style, stage)
                    .await
                    .map_err(SummarizeError::from_completion)?;
                (text, StrategyUsed::Emergency, true)
            }
            Err((_, err)) => return Err(SummarizeError::from_completion(err)),
        };

        let backend_calls = backend.calls();
        self.events.on_event(&PipelineEvent::Finished {
            strategy: Some(strategy),
            was_lossy,
            backend_calls,
        });

        Ok(SummaryResult {
            text: StyleRenderer::annotate(text, strategy, was_lossy),
            strategy,
            was_lossy,
            style,
            trace_id,
            usage: backend.usage(),
            backend_calls,
        })
    }

    fn sampler(&self) -> TextSampler {
        TextSampler::new(self.config.estimator, self.config.sampler)
    }

    fn final_output_tokens(&self, style: SummaryStyle) -> u32 {
        self.config
            .profile
            .cap_output(StyleRenderer::output_tokens(style, &self.config.summary))
    }

    async fn single_pass(
        &self,
        backend: &BackendCall<'_>,
        content: &str,
        style: SummaryStyle,
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest::single_turn(
            SUMMARY_SYSTEM_PROMPT,
            StyleRenderer::direct_prompt(style, content),
            self.final_output_tokens(style),
            self.config.summary.temperature,
        );
        backend.complete(Stage::Summary, &request).await
    }

    /// One retry with a drastically smaller excerpt. Never recurses.
    async fn emergency(
        &self,
        backend: &BackendCall<'_>,
        source: &str,
        style: SummaryStyle,
        stage: Stage,
    ) -> Result<String, CompletionError> {
        let budget_tokens = self
            .config
            .summary
            .emergency_budget_tokens
            .min(self.config.summary_budget())
            .max(1);
        self.events.on_event(&PipelineEvent::EmergencyFallback {
            stage,
            budget_tokens,
        });

        let excerpt = self.sampler().sample(source, budget_tokens);
        self.single_pass(backend, &excerpt.text, style).await
    }

    /// Summarize chunks concurrently, then combine. Returns the combined text
    /// and whether any chunk was replaced by a placeholder.
    async fn chunked(
        &self,
        backend: &BackendCall<'_>,
        source: &str,
        style: SummaryStyle,
    ) -> StageResult<(String, bool)> {
        let chunk_budget = self.config.chunk_budget();
        let chunks = Chunker::new(self.config.estimator).chunk(source, chunk_budget);
        let total = chunks.len();
        self.events.on_event(&PipelineEvent::ChunksPlanned {
            count: total,
            chunk_budget,
        });

        let max_output = self
            .config
            .profile
            .cap_output(self.config.summary.chunk_output_tokens);
        let temperature = self.config.summary.temperature;
        let events = self.events;

        let outcomes: Vec<(usize, Result<String, CompletionError>)> =
            stream::iter(chunks.iter().enumerate())
                .map(|(index, chunk)| async move {
                    let request = CompletionRequest::single_turn(
                        CHUNK_SYSTEM_PROMPT,
                        StyleRenderer::chunk_prompt(index, total, chunk),
                        max_output,
                        temperature,
                    );
                    let outcome = backend
                        .complete(Stage::ChunkSummary { index }, &request)
                        .await;
                    match &outcome {
                        Ok(_) => events.on_event(&PipelineEvent::ChunkCompleted { index, total }),
                        Err(error) => events.on_event(&PipelineEvent::ChunkFailed {
                            index,
                            total,
                            error,
                        }),
                    }
                    (index, outcome)
                })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .collect()
                .await;

        // Completion order is arbitrary; slot results back by chunk index.
        let mut slots: Vec<Option<String>> = vec![None; total];
        let mut errors: Vec<(usize, CompletionError)> = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(text) => slots[index] = Some(text),
                Err(err) => errors.push((index, err)),
            }
        }

        if errors.len() == total {
            errors.sort_by_key(|(index, _)| *index);
            let pos = errors
                .iter()
                .position(|(_, e)| e.is_context_length())
                .unwrap_or(0);
            let (index, err) = errors.swap_remove(pos);
            return Err((Stage::ChunkSummary { index }, err));
        }

        let had_placeholders = !errors.is_empty();
        let sections: Vec<String> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| StyleRenderer::chunk_placeholder(index)))
            .collect();

        let sections = self
            .reduce_sections(backend, sections, style)
            .await
            .map_err(|err| (Stage::Combine, err))?;
        self.events.on_event(&PipelineEvent::CombineStarted {
            sections: sections.len(),
        });
        let request = CompletionRequest::single_turn(
            COMBINE_SYSTEM_PROMPT,
            StyleRenderer::combine_prompt(style, &sections),
            self.final_output_tokens(style),
            temperature,
        );
        let text = backend
            .complete(Stage::Combine, &request)
            .await
            .map_err(|err| (Stage::Combine, err))?;
        Ok((text, had_placeholders))
    }

    /// Merge adjacent section summaries until they fit one combine prompt.
    ///
    /// Only very long sources need this: the section summaries of a few
    /// dozen chunks normally fit the budget on their own.
    async fn reduce_sections(
        &self,
        backend: &BackendCall<'_>,
        mut sections: Vec<String>,
        style: SummaryStyle,
    ) -> Result<Vec<String>, CompletionError> {
        let budget = self.config.summary_budget();
        let estimator = self.config.estimator;
        let max_output = self
            .config
            .profile
            .cap_output(self.config.summary.chunk_output_tokens);

        while sections.len() > 1 && estimator.estimate(&sections.join("\n\n")) > budget {
            let groups = group_to_budget(&sections, self.config.chunk_budget(), |s| {
                estimator.estimate(s)
            });
            if groups.len() >= sections.len() {
                break;
            }
            debug!(
                "Reducing {} section summaries into {} groups",
                sections.len(),
                groups.len()
            );

            let mut merged = Vec::with_capacity(groups.len());
            for group in groups {
                if group.len() == 1 {
                    merged.push(group[0].clone());
                    continue;
                }
                let request = CompletionRequest::single_turn(
                    COMBINE_SYSTEM_PROMPT,
                    StyleRenderer::combine_prompt(style, group),
                    max_output,
                    self.config.summary.temperature,
                );
                merged.push(backend.complete(Stage::Combine, &request).await?);
            }
            sections = merged;
        }
        Ok(sections)
    }
}

/// Split `items` into consecutive groups whose estimated size stays within
/// `budget`. An item larger than the budget forms its own group.
fn group_to_budget<'s>(
    items: &'s [String],
    budget: usize,
    estimate: impl Fn(&str) -> usize,
) -> Vec<&'s [String]> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (i, item) in items.iter().enumerate() {
        let size = estimate(item);
        if i > start && used + size > budget {
            groups.push(&items[start..i]);
            start = i;
            used = 0;
        }
        used += size;
    }
    if start < items.len() {
        groups.push(&items[start..]);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::{Completion, CompletionFuture};
    use crate::context::budget::ModelProfile;
    use crate::pipeline::events::EventObserver;
    use std::sync::Mutex;

    /// Answers every call with a fixed text and records the user prompts.
    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for Echo {
        fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
            let prompt = request
                .messages
                .last()
                .and_then(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            Box::pin(async { Ok(Completion::text("A short summary.")) })
        }
    }

    fn tiny_config() -> PipelineConfig {
        PipelineConfig::new("test-model", ModelProfile::new(12_000, 1_500, 0.0))
    }

    fn sentences(tokens: usize) -> String {
        // 30 bytes per sentence, 10 estimated tokens each.
        "The speaker explains a point. ".repeat(tokens / 10)
    }

    #[test]
    fn strategy_thresholds() {
        let client = Echo::new();
        let planner = SummarizationPlanner::new(&client, tiny_config());
        assert_eq!(planner.select_strategy(10_000), StrategyUsed::Direct);
        assert_eq!(planner.select_strategy(10_001), StrategyUsed::Sampled);
        assert_eq!(planner.select_strategy(20_000), StrategyUsed::Sampled);
        assert_eq!(planner.select_strategy(20_001), StrategyUsed::Chunked);
    }

    #[test]
    fn ceiling_factor_is_tunable() {
        let client = Echo::new();
        let planner =
            SummarizationPlanner::new(&client, tiny_config().with_sampling_ceiling_factor(3.0));
        assert_eq!(planner.select_strategy(25_000), StrategyUsed::Sampled);
    }

    #[tokio::test]
    async fn empty_source_is_rejected() {
        let client = Echo::new();
        let planner = SummarizationPlanner::new(&client, tiny_config());
        let err = planner
            .summarize("   \n ", SummaryStyle::Standard)
            .await
            .unwrap_err();
        assert_eq!(err, SummarizeError::EmptyTranscript);
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunk_results_are_combined_in_order() {
        let client = Echo::new();
        let planner = SummarizationPlanner::new(&client, tiny_config().with_max_concurrency(3));
        let result = planner
            .summarize(&sentences(30_000), SummaryStyle::Detailed)
            .await
            .unwrap();

        assert_eq!(result.strategy, StrategyUsed::Chunked);
        assert!(!result.was_lossy);
        let prompts = client.prompts.lock().unwrap();
        let combine = prompts.last().unwrap();
        assert!(combine.starts_with(StyleRenderer::combine_instruction(SummaryStyle::Detailed)));
        assert_eq!(result.backend_calls, prompts.len());
    }

    /// Rejects every call made with `failing_prompt` as too long.
    struct RejectsStage {
        failing_prompt: &'static str,
    }

    impl CompletionClient for RejectsStage {
        fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
            let result = if request.system_prompt == self.failing_prompt {
                Err(CompletionError::ContextLengthExceeded("too long".into()))
            } else {
                Ok(Completion::text("Summary."))
            };
            Box::pin(async move { result })
        }
    }

    async fn emergency_stage(failing_prompt: &'static str) -> Option<Stage> {
        let client = RejectsStage { failing_prompt };
        let seen = Mutex::new(None);
        let observer = EventObserver::new(|event| {
            if let PipelineEvent::EmergencyFallback { stage, .. } = event {
                *seen.lock().unwrap() = Some(*stage);
            }
        });
        let result = SummarizationPlanner::new(&client, tiny_config())
            .with_event_handler(&observer)
            .summarize(&sentences(30_000), SummaryStyle::Standard)
            .await
            .unwrap();
        assert_eq!(result.strategy, StrategyUsed::Emergency);
        *seen.lock().unwrap()
    }

    #[tokio::test]
    async fn emergency_reports_the_chunk_stage_when_chunks_fail() {
        assert_eq!(
            emergency_stage(CHUNK_SYSTEM_PROMPT).await,
            Some(Stage::ChunkSummary { index: 0 })
        );
    }

    #[tokio::test]
    async fn emergency_reports_the_combine_stage_when_combine_fails() {
        assert_eq!(
            emergency_stage(COMBINE_SYSTEM_PROMPT).await,
            Some(Stage::Combine)
        );
    }

    #[test]
    fn grouping_respects_budget() {
        let items: Vec<String> = vec!["aaa".into(), "bbb".into(), "ccc".into(), "ddd".into()];
        let groups = group_to_budget(&items, 2, |s| s.len() / 3);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], &items[..2]);
        assert_eq!(groups[1], &items[2..]);

        let single = group_to_budget(&items, 0, |s| s.len());
        assert_eq!(single.len(), 4);
    }
}
