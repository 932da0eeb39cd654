//! Representative lossy reduction of long text.
//!
//! Naive head truncation throws away the end of a talk, which is usually
//! where the conclusions are. [`TextSampler`] instead keeps the opening words,
//! the closing words, and an evenly strided sample of the middle, separated by
//! bracketed elision markers so a reader (or model) can tell where content was
//! dropped.
//!
//! Word boundaries are whitespace; the excerpt is re-joined with single
//! spaces. The result is sized in words proportional to the token target, so
//! it lands near the target but is not guaranteed to be under it. Callers that
//! need a harder cap re-sample with a smaller target.
//!
//! Text with few or no spaces (CJK, Thai, long URLs) cannot be reduced word by
//! word. When the word excerpt still overshoots the target by more than a
//! quarter, the sampler cuts a character-boundary head and tail instead, sized
//! by [`TokenEstimator::chars_for`].

use crate::context::budget::TokenEstimator;

/// Marker inserted between the head and the sampled middle.
pub const MIDDLE_SAMPLED_MARKER: &str = "\n[... middle section sampled ...]\n";

/// Marker inserted between the sampled middle and the tail.
pub const CONTENT_CONTINUES_MARKER: &str = "\n[... content continues ...]\n";

/// Marker used when only the tail survives a minimal budget.
pub const EARLIER_OMITTED_MARKER: &str = "[... earlier content omitted ...]\n";

/// Below this many target words there is no room for head + middle + tail;
/// the sampler keeps the tail only.
const MIN_SAMPLED_WORDS: usize = 8;

/// Proportions of the target word count given to each section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Fraction of target words taken from the start. Default: 0.50.
    pub head_fraction: f64,
    /// Fraction of target words taken from the end. Default: 0.25.
    pub tail_fraction: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            head_fraction: 0.50,
            tail_fraction: 0.25,
        }
    }
}

/// Output of [`TextSampler::sample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampled {
    pub text: String,
    pub was_truncated: bool,
}

impl Sampled {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            was_truncated: false,
        }
    }
}

/// Head / strided-middle / tail sampler.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSampler {
    estimator: TokenEstimator,
    config: SamplerConfig,
}

impl TextSampler {
    pub fn new(estimator: TokenEstimator, config: SamplerConfig) -> Self {
        Self { estimator, config }
    }

    /// Reduce `text` to roughly `target_tokens`.
    ///
    /// Text already within the target is returned unchanged with
    /// `was_truncated == false`, which makes sampling idempotent for small
    /// inputs. A zero target yields the smallest non-empty excerpt (the last
    /// word) instead of failing.
    pub fn sample(&self, text: &str, target_tokens: usize) -> Sampled {
        let estimated = self.estimator.estimate(text);
        if estimated <= target_tokens {
            return Sampled::unchanged(text);
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Sampled::unchanged(text);
        }

        let by_words = self.sample_words(&words, estimated, target_tokens);
        let allowance = target_tokens / 4
            + self.estimator.estimate(MIDDLE_SAMPLED_MARKER)
            + self.estimator.estimate(CONTENT_CONTINUES_MARKER);
        if self.estimator.estimate(&by_words) > target_tokens + allowance {
            return self.sample_chars(text, target_tokens);
        }
        Sampled {
            text: by_words,
            was_truncated: true,
        }
    }

    fn sample_words(&self, words: &[&str], estimated: usize, target_tokens: usize) -> String {
        // Scale the word count by the same ratio the token target scales the
        // estimate. `estimated > target_tokens` so this is < words.len().
        let target_words = (words.len() as u128 * target_tokens as u128 / estimated as u128)
            as usize;
        let target_words = target_words.clamp(1, words.len());

        if target_words < MIN_SAMPLED_WORDS {
            let tail = &words[words.len() - target_words..];
            return format!("{EARLIER_OMITTED_MARKER}{}", tail.join(" "));
        }

        let head_len = fraction_of(target_words, self.config.head_fraction);
        let tail_len = fraction_of(target_words, self.config.tail_fraction)
            .min(words.len() - head_len);
        let desired_middle = target_words.saturating_sub(head_len + tail_len);

        let head = &words[..head_len];
        let middle = &words[head_len..words.len() - tail_len];
        let tail = &words[words.len() - tail_len..];

        let sampled_middle: Vec<&str> = if desired_middle == 0 || middle.is_empty() {
            Vec::new()
        } else {
            let stride = middle.len().div_ceil(desired_middle).max(1);
            middle
                .iter()
                .step_by(stride)
                .take(desired_middle)
                .copied()
                .collect()
        };

        let mut parts: Vec<&str> = Vec::with_capacity(target_words + 2);
        parts.extend_from_slice(head);
        if sampled_middle.is_empty() {
            parts.push(CONTENT_CONTINUES_MARKER);
        } else {
            parts.push(MIDDLE_SAMPLED_MARKER);
            parts.extend_from_slice(&sampled_middle);
            parts.push(CONTENT_CONTINUES_MARKER);
        }
        parts.extend_from_slice(tail);
        parts.join(" ")
    }

    /// Head and tail cut on character boundaries, for text that has no usable
    /// word boundaries. Always keeps at least the last character.
    fn sample_chars(&self, text: &str, target_tokens: usize) -> Sampled {
        let budget = self.estimator.chars_for(target_tokens).max(1);
        let shares = self.config.head_fraction + self.config.tail_fraction;
        let head_share = if shares > 0.0 {
            self.config.head_fraction / shares
        } else {
            0.5
        };
        let head_bytes = fraction_of(budget, head_share);
        let tail_bytes = budget - head_bytes;

        let head_end = text
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|&end| end <= head_bytes)
            .last()
            .unwrap_or(0);
        let mut tail_start = text
            .char_indices()
            .rev()
            .map(|(i, _)| i)
            .take_while(|&i| i >= head_end && text.len() - i <= tail_bytes)
            .last()
            .unwrap_or(text.len());
        if tail_start == text.len() {
            tail_start = text.char_indices().next_back().map_or(0, |(i, _)| i);
        }

        let head = text.get(..head_end).unwrap_or_default().trim_end();
        let tail = text.get(tail_start..).unwrap_or_default().trim_start();
        let text = if head.is_empty() {
            format!("{EARLIER_OMITTED_MARKER}{tail}")
        } else {
            format!("{head}{CONTENT_CONTINUES_MARKER}{tail}")
        };
        Sampled {
            text,
            was_truncated: true,
        }
    }
}

fn fraction_of(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction.clamp(0.0, 1.0)).floor() as usize).min(total)
}

/// Whether `text` contains any sampler elision marker.
pub fn has_elision_marker(text: &str) -> bool {
    [
        MIDDLE_SAMPLED_MARKER.trim(),
        CONTENT_CONTINUES_MARKER.trim(),
        EARLIER_OMITTED_MARKER.trim(),
    ]
    .iter()
    .any(|m| text.contains(m))
}
