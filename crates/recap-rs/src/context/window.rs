//! Rolling chat history window.
//!
//! Callers store the full conversation; each request only sends a bounded
//! recency window of it. Older turns are dropped, never summarized. Turns
//! inside the window keep their original chronological order and are never
//! reordered or deduplicated.

use crate::{Message, MessageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of recent turns sent with a chat request.
pub const DEFAULT_HISTORY_WINDOW: usize = 8;

/// Number of turns kept when rebuilding context after an over-budget error.
pub const DEFAULT_EMERGENCY_HISTORY_WINDOW: usize = 2;

/// Speaker of a stored chat turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl From<TurnRole> for MessageRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => MessageRole::User,
            TurnRole::Assistant => MessageRole::Assistant,
        }
    }
}

/// One stored turn of a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    /// When the turn was recorded, if the store tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            created_at: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            created_at: None,
        }
    }

    /// Stamp the turn with the current time.
    pub fn stamped(mut self) -> Self {
        self.created_at = Some(Utc::now());
        self
    }

    pub fn to_message(&self) -> Message {
        match self.role {
            TurnRole::User => Message::user(&self.content),
            TurnRole::Assistant => Message::assistant_text(&self.content),
        }
    }
}

/// Ordered conversation, oldest first.
pub type ChatHistory = Vec<ChatTurn>;

/// A bounded view over the most recent turns of a history.
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow<'a> {
    turns: &'a [ChatTurn],
    dropped: usize,
}

impl<'a> HistoryWindow<'a> {
    /// Keep the last `keep_recent` turns of `history`.
    pub fn recent(history: &'a [ChatTurn], keep_recent: usize) -> Self {
        let start = history.len().saturating_sub(keep_recent);
        Self {
            turns: &history[start..],
            dropped: start,
        }
    }

    /// Turns inside the window, oldest first.
    pub fn turns(&self) -> &'a [ChatTurn] {
        self.turns
    }

    /// Number of older turns left out of the window.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Convert the window into API messages, preserving order.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(ChatTurn::to_message).collect()
    }
}

/// Title for a new chat session derived from its first message:
/// the first 50 characters, with `...` appended when longer.
pub fn session_title(first_message: &str) -> String {
    const MAX_TITLE_CHARS: usize = 50;
    let trimmed = first_message.trim();
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        let head: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}
