//! Context-budgeted summarization and chat over long transcripts.
//!
//! `recap-rs` takes a block of text of any length (typically a video
//! transcript) and either summarizes it or answers questions about it,
//! using a text-generation backend with a fixed context window. Text that
//! does not fit is sampled or chunked; a backend that reports an over-budget
//! request gets one much smaller retry. The caller always learns whether the
//! answer was built from the whole text (`was_lossy`).
//!
//! The production backend is [OpenRouter](https://openrouter.ai/) via
//! [`OpenRouterClient`]; anything implementing
//! [`CompletionClient`](api::client::CompletionClient) works.
//!
//! # Getting started
//!
//! ```ignore
//! use recap_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").map_err(|e| e.to_string())?;
//!     let client = OpenRouterClient::new(api_key)?.with_model("openai/gpt-4o-mini");
//!     let transcript = std::fs::read_to_string("talk.txt").map_err(|e| e.to_string())?;
//!
//!     let result = SummarizationPlanner::new(&client, PipelineConfig::default())
//!         .with_event_handler(&LoggingHandler)
//!         .summarize(&transcript, SummaryStyle::BulletPoints)
//!         .await
//!         .map_err(|e| e.to_string())?;
//!
//!     println!("{}", result.text);
//!     println!("{} via {}", result.usage.summary(), result.strategy);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Summarize a transcript:** [`SummarizationPlanner`](pipeline::SummarizationPlanner)
//!   and [`SummaryStyle`](pipeline::SummaryStyle).
//! - **Answer questions about it:** [`ChatContextAssembler`](pipeline::ChatContextAssembler)
//!   with a [`ChatHistory`](context::ChatHistory).
//! - **Tune budgets and thresholds:** [`PipelineConfig`](pipeline::PipelineConfig) and
//!   [`ModelProfile`](context::ModelProfile).
//! - **Observe decisions:** implement [`EventHandler`](pipeline::EventHandler), or use
//!   [`LoggingHandler`](pipeline::LoggingHandler).
//! - **Plug in another backend:** implement
//!   [`CompletionClient`](api::client::CompletionClient) and report failures with
//!   [`CompletionError`](error::CompletionError).
//! - **Work with transcript text:** [`transcript`] has segments, display
//!   formatting, and statistics.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Summarization planner, chat assembler, styles, events, config |
//! | [`context`] | Token estimation, model profiles, sampling, chunking, history window |
//! | [`api`] | Backend contract, error classification and retry, usage tracking |
//! | [`transcript`] | Source text, segments, display helpers, statistics |
//! | [`error`] | Typed errors for backend calls and summarization |

pub mod api;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod transcript;

use api::client::{Completion, CompletionClient, CompletionFuture, CompletionRequest};
use api::retry::{RetryConfig, classify_api_error, classify_http_error, is_transient_transport_error};
use error::CompletionError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// HTTP-level timeout. The pipeline applies its own, shorter, per-call timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. A zero `max_tokens` is omitted so the
/// backend applies its own limit.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    /// Wire body for a pipeline request against `model`.
    pub fn for_completion(model: impl Into<String>, request: &CompletionRequest) -> Self {
        Self {
            model: model.into(),
            messages: request.to_messages(),
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        }
    }
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Error object embedded in a response body. OpenRouter sends numeric
/// codes, OpenAI-compatible providers send strings.
#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ApiErrorResponse {
    fn code_str(&self) -> Option<String> {
        self.code.as_ref().map(|c| match c {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Turn an HTTP status and body into a completion or a classified error.
fn parse_response(status: u16, text: &str) -> Result<Completion, CompletionError> {
    if !(200..300).contains(&status) {
        return Err(classify_http_error(status, text));
    }

    let parsed: RawChatResponse = serde_json::from_str(text)
        .map_err(|e| CompletionError::Malformed(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(classify_api_error(err.code_str().as_deref(), &err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    match parsed.choices.and_then(|c| c.into_iter().next()) {
        Some(choice) => {
            debug!(
                "LLM output: {} chars text, finish_reason={}",
                choice.message.content.as_ref().map_or(0, |s| s.len()),
                choice.finish_reason.as_deref().unwrap_or("(none)"),
            );
            Ok(Completion {
                content: choice.message.content,
                usage: parsed.usage,
            })
        }
        None => {
            debug!("LLM output: empty (no choices)");
            Ok(Completion {
                content: None,
                usage: parsed.usage,
            })
        }
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
    model: String,
    retry: RetryConfig,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/recap-rs/recap-rs", "recap-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("recap-rs/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Retry transient failures (429, 5xx, network) with backoff.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one chat completion request, without retrying.
    pub async fn chat(&self, body: &ChatRequest) -> Result<Completion, CompletionError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify_transport_error)?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        parse_response(status.as_u16(), &text)
    }
}

fn classify_transport_error(e: reqwest::Error) -> CompletionError {
    let message = format!("request failed: {e}");
    if e.is_timeout() || e.is_connect() || is_transient_transport_error(&message) {
        CompletionError::BackendUnavailable(message)
    } else {
        CompletionError::Rejected(message)
    }
}

impl CompletionClient for OpenRouterClient {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(async move {
            let body = ChatRequest::for_completion(&self.model, request);
            let mut attempt = 0;
            loop {
                match self.chat(&body).await {
                    Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                        let delay = self.retry.delay_for_attempt(attempt);
                        attempt += 1;
                        warn!(
                            "{err}; retrying in {:.1}s ({attempt}/{})",
                            delay.as_secs_f64(),
                            self.retry.max_retries
                        );
                        tokio::time::sleep(delay).await;
                    }
                    other => return other,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::assistant_text("prefill");
        assert_eq!(assist.role, MessageRole::Assistant);
        assert_eq!(assist.content.as_deref(), Some("prefill"));
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let request = CompletionRequest::single_turn("sys", "hi", 100, 0.5);
        let body = ChatRequest::for_completion("test-model", &request);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 100);

        let unbounded = CompletionRequest::single_turn("sys", "hi", 0, 0.5);
        let json = serde_json::to_value(ChatRequest::for_completion("m", &unbounded)).unwrap();
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn parses_successful_response() {
        let body = r#"{
            "choices": [{"message": {"content": "A summary."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }"#;
        let completion = parse_response(200, body).unwrap();
        assert_eq!(completion.content.as_deref(), Some("A summary."));
        assert_eq!(completion.usage.unwrap().total_tokens, Some(150));
    }

    #[test]
    fn context_length_http_error() {
        let body = r#"{"error":{"message":"This endpoint's maximum context length is 16385 tokens","code":400}}"#;
        assert!(parse_response(400, body).unwrap_err().is_context_length());
    }

    #[test]
    fn embedded_error_with_numeric_code() {
        let body = r#"{"error":{"message":"No auth credentials found","code":401}}"#;
        let err = parse_response(200, body).unwrap_err();
        assert!(matches!(err, CompletionError::Rejected(_)));

        let body = r#"{"error":{"message":"Provider returned error","code":502}}"#;
        assert!(parse_response(200, body).unwrap_err().is_retryable());
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(parse_response(200, "<html>").unwrap_err().is_malformed());
    }

    #[test]
    fn no_choices_yields_empty_completion() {
        let completion = parse_response(200, r#"{"choices": []}"#).unwrap();
        assert!(completion.into_text().unwrap_err().is_malformed());
    }

    #[test]
    fn client_defaults() {
        let client = OpenRouterClient::new("key").unwrap().with_model("openai/gpt-4o");
        assert_eq!(client.model(), "openai/gpt-4o");
        assert_eq!(client.retry.max_retries, 0);
    }
}
