//! Conversational answers about a source text.
//!
//! [`ChatContextAssembler`] builds one bounded request per user question:
//!
//! 1. The transcript is sampled down to the chat transcript budget, a smaller
//!    share of the window than summarization gets, since history and the
//!    live question need room too.
//! 2. Only the most recent `history_window` turns are sent, in their original
//!    order. Older turns are dropped.
//! 3. On a context-length error the request is rebuilt once with a small
//!    transcript excerpt and the last `emergency_history_window` turns.
//!
//! Chat never returns an error. When the backend cannot answer, the reply is
//! a canned apology and [`ChatResult::fallback`] says why.

use super::backend::BackendCall;
use super::config::PipelineConfig;
use super::events::{EventHandler, NoopHandler, PipelineEvent, Stage};
use crate::Message;
use crate::api::client::{CompletionClient, CompletionRequest};
use crate::api::tracing::{CostTracker, generate_trace_id};
use crate::context::sampler::TextSampler;
use crate::context::window::{ChatTurn, HistoryWindow};
use crate::error::CompletionError;
use serde::Serialize;
use tracing::{Instrument, debug, info_span, warn};

/// Reply when even the emergency request was too large.
pub const TOO_LONG_REPLY: &str = "I'm sorry, but this video is too long for me to process in \
chat. Please try asking about a shorter video, or use the summarization feature first to get \
key points.";

/// Reply when the backend failed for any other reason.
pub const UNAVAILABLE_REPLY: &str = "I'm sorry, I'm having trouble answering right now. \
Please try again in a moment.";

/// Appended to replies produced from the emergency excerpt.
pub const EXCERPT_REPLY_NOTE: &str = "[Note: Answer based on excerpt due to video length]";

/// Why a chat request was answered with a canned reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatFallback {
    /// The context did not fit even after the emergency rebuild.
    TooLong,
    /// The backend failed, timed out, or returned nothing usable.
    Unavailable,
}

impl ChatFallback {
    pub fn reply(&self) -> &'static str {
        match self {
            ChatFallback::TooLong => TOO_LONG_REPLY,
            ChatFallback::Unavailable => UNAVAILABLE_REPLY,
        }
    }
}

/// Outcome of a chat request. Always carries a reply.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub reply: String,
    /// Whether the backend saw less than the full transcript.
    pub was_lossy: bool,
    /// Set when `reply` is a canned message rather than a backend answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ChatFallback>,
    pub trace_id: String,
    pub usage: CostTracker,
    pub backend_calls: usize,
}

/// System prompt for a regular chat request.
pub fn chat_system_prompt(transcript: &str, shortened: bool) -> String {
    let note = if shortened {
        " Note: Transcript shortened for processing."
    } else {
        ""
    };
    format!(
        "You are a helpful AI assistant answering questions about a video. Here is the \
         transcript:\n\n{transcript}\n\nAnswer based on this content. Be helpful and reference \
         specific parts when relevant.{note}"
    )
}

/// System prompt for the emergency rebuild.
pub fn excerpt_system_prompt(excerpt: &str) -> String {
    format!(
        "Answer questions about this video excerpt:\n\n{excerpt}\n\nNote: This is an excerpt \
         from a longer video."
    )
}

/// Answers questions about one source text.
///
/// ```ignore
/// let assembler = ChatContextAssembler::new(&client, PipelineConfig::default());
/// let result = assembler.chat(&transcript, &history, "What was the main argument?").await;
/// history.push(ChatTurn::user("What was the main argument?"));
/// history.push(ChatTurn::assistant(&result.reply));
/// ```
pub struct ChatContextAssembler<'a> {
    client: &'a dyn CompletionClient,
    config: PipelineConfig,
    events: &'a dyn EventHandler,
}

impl<'a> ChatContextAssembler<'a> {
    pub fn new(client: &'a dyn CompletionClient, config: PipelineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Chatting with an unusable config: {e}");
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

    /// Answer `user_message` about `source`, given the prior conversation.
    ///
    /// `history` is read, never modified; appending the new turns is the
    /// caller's job.
    pub async fn chat(&self, source: &str, history: &[ChatTurn], user_message: &str) -> ChatResult {
        let trace_id = generate_trace_id();
        let span = info_span!(
            "chat",
            trace_id = %trace_id,
            model = %self.config.model,
            history_turns = history.len(),
        );
        self.run(source, history, user_message, trace_id)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        source: &str,
        history: &[ChatTurn],
        user_message: &str,
        trace_id: String,
    ) -> ChatResult {
        let backend = BackendCall::new(
            self.client,
            self.events,
            &self.config.model,
            &self.config.profile,
            self.config.estimator,
            self.config.call_timeout,
        );
        let policy = &self.config.chat;
        let sampler = TextSampler::new(self.config.estimator, self.config.sampler);

        let budget = self.config.chat_transcript_budget();
        let transcript = sampler.sample(source, budget);
        if transcript.was_truncated {
            self.events.on_event(&PipelineEvent::Sampled {
                original_tokens: self.config.estimator.estimate(source),
                sampled_tokens: self.config.estimator.estimate(&transcript.text),
            });
        }

        let window = HistoryWindow::recent(history, policy.history_window);
        self.events.on_event(&PipelineEvent::HistoryWindowed {
            kept: window.len(),
            dropped: window.dropped(),
        });

        let request = build_request(
            chat_system_prompt(&transcript.text, transcript.was_truncated),
            window,
            user_message,
            self.config.profile.cap_output(policy.max_output_tokens),
            policy.temperature,
        );

        let (reply, was_lossy, fallback) = match backend.complete(Stage::Chat, &request).await {
            Ok(reply) => (reply, transcript.was_truncated, None),
            Err(err) if err.is_context_length() => {
                debug!("Chat context too large: {err}");
                self.emergency(&backend, &sampler, source, history, user_message)
                    .await
            }
            Err(err) => self.give_up(ChatFallback::Unavailable, &err),
        };

        let backend_calls = backend.calls();
        self.events.on_event(&PipelineEvent::Finished {
            strategy: None,
            was_lossy,
            backend_calls,
        });

        ChatResult {
            reply,
            was_lossy,
            fallback,
            trace_id,
            usage: backend.usage(),
            backend_calls,
        }
    }

    async fn emergency(
        &self,
        backend: &BackendCall<'_>,
        sampler: &TextSampler,
        source: &str,
        history: &[ChatTurn],
        user_message: &str,
    ) -> (String, bool, Option<ChatFallback>) {
        let policy = &self.config.chat;
        let budget_tokens = policy
            .emergency_budget_tokens
            .min(self.config.chat_transcript_budget())
            .max(1);
        self.events.on_event(&PipelineEvent::EmergencyFallback {
            stage: Stage::Chat,
            budget_tokens,
        });

        let excerpt = sampler.sample(source, budget_tokens);
        let window = HistoryWindow::recent(history, policy.emergency_history_window);
        let request = build_request(
            excerpt_system_prompt(&excerpt.text),
            window,
            user_message,
            self.config.profile.cap_output(policy.emergency_output_tokens),
            policy.temperature,
        );

        match backend.complete(Stage::Chat, &request).await {
            Ok(reply) => (format!("{reply}\n\n{EXCERPT_REPLY_NOTE}"), true, None),
            Err(err) => self.give_up(ChatFallback::TooLong, &err),
        }
    }

    fn give_up(
        &self,
        fallback: ChatFallback,
        err: &CompletionError,
    ) -> (String, bool, Option<ChatFallback>) {
        self.events
            .on_event(&PipelineEvent::ChatFallback { reason: err });
        (fallback.reply().to_string(), false, Some(fallback))
    }
}

fn build_request(
    system_prompt: String,
    window: HistoryWindow<'_>,
    user_message: &str,
    max_output_tokens: u32,
    temperature: f32,
) -> CompletionRequest {
    let mut messages = window.to_messages();
    messages.push(Message::user(user_message));
    CompletionRequest {
        system_prompt,
        messages,
        max_output_tokens,
        temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::{Completion, CompletionFuture};
    use crate::context::budget::ModelProfile;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<Completion, CompletionError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Completion, CompletionError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for Scripted {
        fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.replies.lock().unwrap().remove(0);
            Box::pin(async move { next })
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new("test-model", ModelProfile::new(12_000, 1_500, 0.0))
    }

    #[tokio::test]
    async fn short_transcript_is_sent_whole() {
        let client = Scripted::new(vec![Ok(Completion::text("It is about cats."))]);
        let assembler = ChatContextAssembler::new(&client, config());
        let result = assembler
            .chat("A video about cats.", &[], "What is it about?")
            .await;

        assert_eq!(result.reply, "It is about cats.");
        assert!(!result.was_lossy);
        assert!(result.fallback.is_none());

        let requests = client.requests.lock().unwrap();
        assert!(requests[0].system_prompt.contains("A video about cats."));
        assert!(!requests[0].system_prompt.contains("shortened"));
        assert_eq!(
            requests[0].messages.last().unwrap().content.as_deref(),
            Some("What is it about?")
        );
    }

    #[tokio::test]
    async fn emergency_reply_carries_note() {
        let client = Scripted::new(vec![
            Err(CompletionError::ContextLengthExceeded("too long".into())),
            Ok(Completion::text("Partial answer.")),
        ]);
        let assembler = ChatContextAssembler::new(&client, config());
        let history: Vec<ChatTurn> = (0..6)
            .map(|i| ChatTurn::user(format!("question {i}")))
            .collect();
        let result = assembler.chat("Some transcript.", &history, "And?").await;

        assert!(result.was_lossy);
        assert!(result.reply.ends_with(EXCERPT_REPLY_NOTE));
        assert_eq!(result.backend_calls, 2);

        let requests = client.requests.lock().unwrap();
        // Two history turns plus the live question.
        assert_eq!(requests[1].messages.len(), 3);
        assert!(requests[1].system_prompt.starts_with("Answer questions about this video excerpt"));
    }

    #[tokio::test]
    async fn unavailable_backend_gets_canned_reply() {
        let client = Scripted::new(vec![Err(CompletionError::BackendUnavailable(
            "HTTP 503".into(),
        ))]);
        let assembler = ChatContextAssembler::new(&client, config());
        let result = assembler.chat("Transcript.", &[], "Hi").await;

        assert_eq!(result.reply, UNAVAILABLE_REPLY);
        assert_eq!(result.fallback, Some(ChatFallback::Unavailable));
        assert_eq!(result.backend_calls, 1);
    }

    #[tokio::test]
    async fn long_transcript_is_marked_shortened() {
        let client = Scripted::new(vec![Ok(Completion::text("Answer."))]);
        let assembler = ChatContextAssembler::new(&client, config());
        let transcript = "word ".repeat(20_000);
        let result = assembler.chat(&transcript, &[], "Summarize?").await;

        assert!(result.was_lossy);
        let requests = client.requests.lock().unwrap();
        assert!(requests[0].system_prompt.contains("Transcript shortened for processing."));
    }
}
