//! Summary styles and the prompts that express them.
//!
//! [`StyleRenderer`] is stateless: every method maps its inputs to prompt
//! text. The only post-processing it does is [`annotate`](StyleRenderer::annotate),
//! which appends a disclaimer to lossy summaries and leaves everything else
//! untouched.

use super::config::SummaryPolicy;
use super::events::StrategyUsed;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// System prompt for a single-pass summary.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that creates clear, \
informative summaries of video content. Focus on accuracy and readability.";

/// System prompt for one chunk of a chunked summary.
pub const CHUNK_SYSTEM_PROMPT: &str = "You are summarizing a section of a video transcript. \
Be concise but capture the key information.";

/// System prompt for the combine step of a chunked summary.
pub const COMBINE_SYSTEM_PROMPT: &str = "You are creating a final summary from multiple \
section summaries. Make it coherent and well-structured.";

/// Appended to summaries built from a sampled transcript.
pub const SAMPLED_NOTE: &str = "[Note: Summary based on key sections of a very long video]";

/// Appended to summaries built from the emergency excerpt.
pub const EMERGENCY_NOTE: &str =
    "[Note: Summary based on abbreviated version due to length constraints]";

/// Appended to chunked summaries where some sections failed.
pub const PARTIAL_CHUNKS_NOTE: &str =
    "[Note: Some sections of this video could not be processed and are missing from the summary]";

/// Shape of the requested summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStyle {
    #[default]
    Standard,
    Detailed,
    BulletPoints,
}

impl SummaryStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::Standard => "standard",
            SummaryStyle::Detailed => "detailed",
            SummaryStyle::BulletPoints => "bullet-points",
        }
    }
}

impl fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse: unrecognised names fall back to [`SummaryStyle::Standard`].
impl FromStr for SummaryStyle {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "detailed" => SummaryStyle::Detailed,
            "bullet" | "bullets" | "bulletpoints" => SummaryStyle::BulletPoints,
            _ => SummaryStyle::Standard,
        })
    }
}

/// Builds style-specific prompts and post-processes results.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleRenderer;

impl StyleRenderer {
    /// Instruction line for a single-pass summary.
    pub fn direct_instruction(style: SummaryStyle) -> &'static str {
        match style {
            SummaryStyle::Detailed => {
                "Please provide a detailed summary of the following video transcript. \
                 Include key points, main arguments, examples mentioned, and important \
                 conclusions. The summary should be comprehensive but well-organized:"
            }
            SummaryStyle::BulletPoints => {
                "Please summarize the following video transcript in clear bullet points. \
                 Focus on the main ideas, key takeaways, and important information:"
            }
            SummaryStyle::Standard => {
                "Please provide a concise but informative summary of the following video \
                 transcript. Focus on the main points and key takeaways:"
            }
        }
    }

    /// User prompt for a single-pass summary of `content`.
    pub fn direct_prompt(style: SummaryStyle, content: &str) -> String {
        format!("{}\n\n{content}", Self::direct_instruction(style))
    }

    /// User prompt for chunk `index` (0-based) of `total`.
    ///
    /// Chunk prompts are style-neutral; the style is applied when combining.
    pub fn chunk_prompt(index: usize, total: usize, content: &str) -> String {
        format!(
            "Summarize this section (part {} of {total}) of a video transcript. \
             Focus on the key points and main ideas:\n\n{content}",
            index + 1
        )
    }

    /// Instruction line for the combine step.
    pub fn combine_instruction(style: SummaryStyle) -> &'static str {
        match style {
            SummaryStyle::Detailed => {
                "Create a detailed, comprehensive summary from these section summaries of a \
                 video. Organize the information logically and ensure it flows well:"
            }
            SummaryStyle::BulletPoints => {
                "Create a bullet-point summary from these section summaries. Extract the most \
                 important points and organize them clearly:"
            }
            SummaryStyle::Standard => {
                "Create a concise, well-organized summary from these section summaries of a video:"
            }
        }
    }

    /// User prompt that merges ordered section summaries into one text.
    pub fn combine_prompt(style: SummaryStyle, sections: &[String]) -> String {
        format!(
            "{}\n\n{}",
            Self::combine_instruction(style),
            sections.join("\n\n")
        )
    }

    /// Stand-in for a chunk whose summary could not be produced.
    pub fn chunk_placeholder(index: usize) -> String {
        format!("[Error processing section {}]", index + 1)
    }

    /// Output token allowance for a final summary in `style`.
    pub fn output_tokens(style: SummaryStyle, policy: &SummaryPolicy) -> u32 {
        match style {
            SummaryStyle::Detailed => policy.detailed_output_tokens,
            SummaryStyle::Standard | SummaryStyle::BulletPoints => policy.standard_output_tokens,
        }
    }

    /// Disclaimer for a lossy result produced by `strategy`.
    pub fn lossy_note(strategy: StrategyUsed) -> &'static str {
        match strategy {
            StrategyUsed::Emergency => EMERGENCY_NOTE,
            StrategyUsed::Chunked => PARTIAL_CHUNKS_NOTE,
            StrategyUsed::Direct | StrategyUsed::Sampled => SAMPLED_NOTE,
        }
    }

    /// Append the lossy disclaimer when `was_lossy`; otherwise return `text` as-is.
    pub fn annotate(text: String, strategy: StrategyUsed, was_lossy: bool) -> String {
        if !was_lossy {
            return text;
        }
        format!("{text}\n\n{}", Self::lossy_note(strategy))
    }
}
