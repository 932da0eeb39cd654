//! Sentence-bounded chunking for divide-and-combine summarization.
//!
//! A sentence ends at a run of `.`, `!` or `?` followed by whitespace or the
//! end of the text, so decimals ("3.5") and dotted names ("example.com") stay
//! intact. Sentences are packed greedily, in order, into chunks whose estimate
//! stays under the per-chunk budget. A sentence larger than the budget becomes
//! a chunk of its own.

use crate::context::budget::TokenEstimator;

/// Split `text` into sentences, keeping terminal punctuation and trimming
/// surrounding whitespace. Empty sentences are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        // Swallow the rest of a punctuation run ("?!", "...").
        let mut end = idx + ch.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?') {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = chars.peek().is_none_or(|&(_, next)| next.is_whitespace());
        if at_boundary {
            push_trimmed(&mut sentences, text.get(start..end).unwrap_or_default());
            start = end;
        }
    }
    push_trimmed(&mut sentences, text.get(start..).unwrap_or_default());
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, sentence: &'a str) {
    let trimmed = sentence.trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
}

/// Greedy sentence packer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    estimator: TokenEstimator,
}

impl Chunker {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Split `text` into ordered chunks of at most `max_tokens_per_chunk`
    /// (best effort; see module docs for the oversized-sentence case).
    pub fn chunk(&self, text: &str, max_tokens_per_chunk: usize) -> Vec<String> {
        let budget = max_tokens_per_chunk.max(1);
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_sentences(text) {
            if current.is_empty() {
                current.push_str(sentence);
                continue;
            }
            // +1 for the joining space.
            let combined = self.estimator.estimate(&current)
                + self.estimator.estimate(sentence)
                + 1;
            if combined > budget {
                chunks.push(std::mem::take(&mut current));
                current.push_str(sentence);
            } else {
                current.push(' ');
                current.push_str(sentence);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("This is sentence number {i} of the talk."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        let s = split_sentences("Hello there. How are you? Great!  Done");
        assert_eq!(s, vec!["Hello there.", "How are you?", "Great!", "Done"]);
    }

    #[test]
    fn keeps_decimals_and_dotted_names() {
        let s = split_sentences("Version 3.5 shipped on example.com today. Next.");
        assert_eq!(s, vec!["Version 3.5 shipped on example.com today.", "Next."]);
    }

    #[test]
    fn punctuation_runs_stay_together() {
        let s = split_sentences("Wait... really?! Yes.");
        assert_eq!(s, vec!["Wait...", "really?!", "Yes."]);
    }

    #[test]
    fn every_chunk_within_budget() {
        let chunker = Chunker::default();
        let text = transcript(500);
        let chunks = chunker.chunk(&text, 200);
        assert!(chunks.len() > 1);
        let est = TokenEstimator::default();
        for chunk in &chunks {
            assert!(est.estimate(chunk) <= 200, "chunk too large: {}", chunk.len());
        }
    }

    #[test]
    fn chunks_partition_sentences_in_order() {
        let chunker = Chunker::default();
        let text = transcript(300);
        let chunks = chunker.chunk(&text, 150);

        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| split_sentences(c)).collect();
        assert_eq!(rejoined, split_sentences(&text));
    }

    #[test]
    fn oversized_sentence_is_its_own_chunk() {
        let chunker = Chunker::default();
        let long = format!("{}.", "word ".repeat(400).trim_end());
        let text = format!("Short one. {long} Short two.");
        let chunks = chunker.chunk(&text, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "Short one.");
        assert_eq!(chunks[1], long);
        assert_eq!(chunks[2], "Short two.");
    }

    #[test]
    fn never_splits_mid_word() {
        let chunker = Chunker::default();
        let text = transcript(100);
        for chunk in chunker.chunk(&text, 40) {
            assert!(chunk.starts_with("This"));
            assert!(chunk.ends_with('.'));
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(Chunker::default().chunk("   ", 100).is_empty());
    }
}
