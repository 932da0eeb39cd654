//! Transcript text and the display helpers built around it.
//!
//! A [`SourceText`] is the immutable input to the pipeline: the full text,
//! optionally with time-coded [`Segment`]s. Segments are for display only;
//! budgeting always works on the text.

use crate::context::chunker::split_sentences;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Spacing of synthesized segments when a transcript has no timing.
const PSEUDO_SEGMENT_SECONDS: f64 = 5.0;

/// Reading speed used for [`TranscriptStats::reading_minutes`].
const WORDS_PER_MINUTE: usize = 200;

/// Default number of keywords in [`TranscriptStats`].
pub const DEFAULT_KEYWORD_LIMIT: usize = 10;

/// One time-coded piece of a transcript.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Segment {
    pub text: String,
    #[serde(alias = "start", alias = "offset")]
    pub start_seconds: f64,
    #[serde(alias = "duration")]
    pub duration_seconds: f64,
}

/// The text a summarize or chat request works on.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SourceText {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    segments: Option<Vec<Segment>>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: None,
        }
    }

    /// Build from ordered segments; the text is their contents joined by spaces.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            text,
            segments: Some(segments),
        }
    }

    /// Parse file contents: a JSON array of segments, or plain text.
    pub fn parse(content: &str) -> Self {
        if content.trim_start().starts_with('[')
            && let Ok(segments) = serde_json::from_str::<Vec<Segment>>(content)
        {
            return Self::from_segments(segments);
        }
        Self::new(content)
    }

    /// Read and [`parse`](Self::parse) a transcript file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read transcript '{}': {e}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Real segments, if the transcript came with timing.
    pub fn segments(&self) -> Option<&[Segment]> {
        self.segments.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Segments for display: the real ones, or one pseudo-segment per
    /// sentence at fixed 5-second spacing.
    pub fn display_segments(&self) -> Vec<Segment> {
        if let Some(segments) = &self.segments {
            return segments.clone();
        }
        split_sentences(&self.text)
            .into_iter()
            .enumerate()
            .map(|(i, sentence)| Segment {
                text: sentence.to_string(),
                start_seconds: i as f64 * PSEUDO_SEGMENT_SECONDS,
                duration_seconds: PSEUDO_SEGMENT_SECONDS,
            })
            .collect()
    }

    /// Display segments containing `term`, case-insensitively. An empty term
    /// matches everything.
    pub fn search(&self, term: &str) -> Vec<Segment> {
        let needle = term.trim().to_lowercase();
        self.display_segments()
            .into_iter()
            .filter(|s| needle.is_empty() || s.text.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn stats(&self) -> TranscriptStats {
        TranscriptStats::of(&self.text)
    }
}

impl AsRef<str> for SourceText {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl From<String> for SourceText {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Summary statistics of a transcript.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TranscriptStats {
    pub word_count: usize,
    pub sentence_count: usize,
    /// Rounded to the nearest whole word.
    pub avg_words_per_sentence: usize,
    /// At 200 words per minute, rounded up.
    pub reading_minutes: usize,
    pub keywords: Vec<String>,
}

impl TranscriptStats {
    pub fn of(text: &str) -> Self {
        let word_count = text.split_whitespace().count();
        let sentence_count = split_sentences(text).len();
        let avg_words_per_sentence = if sentence_count == 0 {
            0
        } else {
            (word_count as f64 / sentence_count as f64).round() as usize
        };
        Self {
            word_count,
            sentence_count,
            avg_words_per_sentence,
            reading_minutes: word_count.div_ceil(WORDS_PER_MINUTE),
            keywords: keywords(text, DEFAULT_KEYWORD_LIMIT),
        }
    }
}

/// Most frequent words longer than four characters.
///
/// Words are lowercased and split on anything that is not alphanumeric or
/// `_`. Ties keep first-appearance order.
pub fn keywords(text: &str, limit: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.chars().count() > 4)
        .enumerate()
    {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(word, _, _)| word.to_string())
        .collect()
}

/// Collapse whitespace and start a new paragraph after each sentence.
pub fn format_for_display(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut words = text.split_whitespace().peekable();
    while let Some(word) = words.next() {
        out.push_str(word);
        if words.peek().is_some() {
            if word.ends_with(['.', '!', '?']) {
                out.push_str("\n\n");
            } else {
                out.push(' ');
            }
        }
    }
    out
}

/// `m:ss`, or `h:mm:ss` from one hour on. Negative input counts as zero.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
