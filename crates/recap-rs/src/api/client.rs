//! The completion backend contract.
//!
//! The pipeline never talks HTTP directly. It builds a [`CompletionRequest`]
//! and hands it to a [`CompletionClient`]. [`OpenRouterClient`](crate::OpenRouterClient)
//! is the production implementation; tests script their own.

use crate::error::CompletionError;
use crate::{Message, UsageInfo};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`CompletionClient::complete`].
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Completion, CompletionError>> + Send + 'a>>;

/// One call to a text-generation backend.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt sent ahead of `messages`.
    pub system_prompt: String,
    /// Conversation turns, oldest first. The last one is the live user turn.
    pub messages: Vec<Message>,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// A single-turn request: system prompt plus one user message.
    pub fn single_turn(
        system_prompt: impl Into<String>,
        user: impl Into<String>,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: vec![Message::user(user)],
            max_output_tokens,
            temperature,
        }
    }

    /// Total bytes of prompt content (system prompt plus every message).
    pub fn content_len(&self) -> usize {
        self.system_prompt.len()
            + self
                .messages
                .iter()
                .map(|m| m.content.as_ref().map_or(0, |c| c.len()))
                .sum::<usize>()
    }

    /// Full message list with the system prompt first, as sent on the wire.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut msgs = Vec::with_capacity(self.messages.len() + 1);
        msgs.push(Message::system(&self.system_prompt));
        msgs.extend(self.messages.iter().cloned());
        msgs
    }
}

/// A successful backend response.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            usage: None,
        }
    }

    /// Trimmed, non-empty content, or `Malformed` if there is none.
    pub fn into_text(self) -> Result<String, CompletionError> {
        match self.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(CompletionError::Malformed(
                "backend returned an empty completion".into(),
            )),
        }
    }
}

/// A text-generation backend with a fixed context window.
///
/// Implementations must report over-budget failures as
/// [`CompletionError::ContextLengthExceeded`] and transient failures as
/// [`CompletionError::BackendUnavailable`]; the pipeline's fallback logic
/// depends on telling the two apart.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a>;
}
