use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::planner::SplitGranularity;
use crate::{CharHeuristic, TokenEstimator, CHUNK_SEPARATOR};

// A blank line, possibly holding stray spaces or tabs.
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("invalid paragraph break regex"));

// Sentence terminator followed by whitespace; the terminator stays with its sentence.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("invalid sentence end regex"));

const SENTENCE_SEPARATOR: &str = " ";

/// Boundary-aware splitter: packs paragraphs greedily under a token budget and
/// falls back to sentences for paragraphs that do not fit on their own.
///
/// A single sentence larger than the budget is emitted as its own oversized
/// segment; nothing finer than a sentence is ever cut.
#[derive(Clone)]
pub struct BoundarySplitter {
    max_tokens: usize,
    granularity: SplitGranularity,
    estimator: Arc<dyn TokenEstimator>,
}

impl std::fmt::Debug for BoundarySplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundarySplitter")
            .field("max_tokens", &self.max_tokens)
            .field("granularity", &self.granularity)
            .finish_non_exhaustive()
    }
}

impl BoundarySplitter {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            granularity: SplitGranularity::Paragraph,
            estimator: Arc::new(CharHeuristic),
        }
    }

    pub fn with_granularity(mut self, granularity: SplitGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn estimate(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    /// Split `text` into ordered segments. Empty or whitespace-only input
    /// yields no segments.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for paragraph in paragraphs(text) {
            match self.granularity {
                SplitGranularity::Paragraph => {
                    if self.estimate(paragraph) <= self.max_tokens {
                        self.push_unit(&mut chunks, &mut current, paragraph, CHUNK_SEPARATOR);
                        continue;
                    }
                    // Oversized paragraph: close what we have and pack its sentences
                    // into chunks of their own.
                    flush(&mut chunks, &mut current);
                    for sentence in sentences(paragraph) {
                        self.push_unit(&mut chunks, &mut current, sentence, SENTENCE_SEPARATOR);
                    }
                    flush(&mut chunks, &mut current);
                }
                SplitGranularity::Sentence => {
                    for (i, sentence) in sentences(paragraph).into_iter().enumerate() {
                        let separator = if i == 0 {
                            CHUNK_SEPARATOR
                        } else {
                            SENTENCE_SEPARATOR
                        };
                        self.push_unit(&mut chunks, &mut current, sentence, separator);
                    }
                }
            }
        }

        flush(&mut chunks, &mut current);
        chunks
    }

    /// True when `chunk` exceeds the budget only because it is one sentence
    /// that cannot be split further.
    pub fn is_unsplittable(&self, chunk: &str) -> bool {
        let mut paragraphs = paragraphs(chunk);
        match (paragraphs.next(), paragraphs.next()) {
            (Some(only), None) => sentences(only).len() <= 1,
            (None, _) => true,
            _ => false,
        }
    }

    fn push_unit(&self, chunks: &mut Vec<String>, current: &mut String, unit: &str, separator: &str) {
        if current.is_empty() {
            current.push_str(unit);
            return;
        }

        let candidate = format!("{current}{separator}{unit}");
        if self.estimate(&candidate) <= self.max_tokens {
            *current = candidate;
        } else {
            chunks.push(std::mem::take(current));
            current.push_str(unit);
        }
    }
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(paragraph) {
        // The terminator is a single ASCII byte.
        let end = m.start() + 1;
        let sentence = paragraph[start..end].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = m.end();
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate_tokens;
    use proptest::prelude::*;

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn short_text_is_one_segment() {
        let splitter = BoundarySplitter::new(400);
        assert_eq!(splitter.split("Hello world."), vec!["Hello world."]);
    }

    #[test]
    fn blank_input_yields_nothing() {
        let splitter = BoundarySplitter::new(10);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split(" \n\n \t\n").is_empty());
    }

    #[test]
    fn packs_paragraphs_greedily() {
        // 40 chars per paragraph; three joined by blank lines = 124 chars = 31 tokens.
        let paragraphs: Vec<String> = (0..7).map(|i| format!("P{i}{}", "a".repeat(38))).collect();
        let text = paragraphs.join("\n\n");

        let chunks = BoundarySplitter::new(31).split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], paragraphs[0..3].join("\n\n"));
        assert_eq!(chunks[1], paragraphs[3..6].join("\n\n"));
        assert_eq!(chunks[2], paragraphs[6]);
    }

    #[test]
    fn blank_lines_with_spaces_count_as_paragraph_breaks() {
        let splitter = BoundarySplitter::new(3);
        let chunks = splitter.split("First one.\n   \nSecond one.");
        assert_eq!(chunks, vec!["First one.", "Second one."]);
    }

    #[test]
    fn oversized_paragraph_falls_back_to_sentences() {
        let text = "Short intro.\n\nThe first sentence is here. The second sentence is here! Is this the third?";
        let splitter = BoundarySplitter::new(8);
        let chunks = splitter.split(text);

        assert_eq!(
            chunks,
            vec![
                "Short intro.",
                "The first sentence is here.",
                "The second sentence is here!",
                "Is this the third?",
            ]
        );
        assert!(chunks.iter().all(|c| estimate_tokens(c) <= 8));
    }

    #[test]
    fn oversized_sentence_is_emitted_alone() {
        let long = format!("{} end.", "word ".repeat(40));
        let text = format!("Tiny.\n\n{long} Next bit.");
        let splitter = BoundarySplitter::new(10);
        let chunks = splitter.split(&text);

        assert_eq!(chunks[0], "Tiny.");
        assert_eq!(chunks[1], long.trim());
        assert_eq!(chunks[2], "Next bit.");
        assert!(estimate_tokens(&chunks[1]) > 10);
        assert!(splitter.is_unsplittable(&chunks[1]));
    }

    #[test]
    fn sentence_granularity_packs_across_paragraphs() {
        let splitter = BoundarySplitter::new(100).with_granularity(SplitGranularity::Sentence);
        let chunks = splitter.split("One. Two.\n\nThree.");
        assert_eq!(chunks, vec!["One. Two.\n\nThree."]);
    }

    #[test]
    fn unsplittable_detection() {
        let splitter = BoundarySplitter::new(1);
        assert!(splitter.is_unsplittable("Just one sentence without a break"));
        assert!(!splitter.is_unsplittable("One. Two."));
        assert!(!splitter.is_unsplittable("One\n\nTwo"));
    }

    #[test]
    fn custom_estimator_is_used() {
        struct WordCount;
        impl TokenEstimator for WordCount {
            fn estimate(&self, text: &str) -> usize {
                text.split_whitespace().count()
            }
        }

        let splitter = BoundarySplitter::new(2).with_estimator(Arc::new(WordCount));
        let chunks = splitter.split("a b\n\nc d\n\ne");
        assert_eq!(chunks, vec!["a b", "c d", "e"]);
    }

    fn document() -> impl Strategy<Value = String> {
        let sentence = prop::collection::vec("[a-z]{1,12}", 1..12)
            .prop_map(|w| format!("{}.", w.join(" ")));
        let paragraph = prop::collection::vec(sentence, 1..6).prop_map(|s| s.join(" "));
        prop::collection::vec(paragraph, 1..12).prop_map(|p| p.join("\n\n"))
    }

    proptest! {
        #[test]
        fn split_preserves_every_word_in_order(text in document(), budget in 1usize..200) {
            let chunks = BoundarySplitter::new(budget).split(&text);
            let rejoined = chunks.join(CHUNK_SEPARATOR);
            prop_assert_eq!(words(&rejoined), words(&text));
        }

        #[test]
        fn chunks_respect_budget_unless_single_sentence(text in document(), budget in 1usize..200) {
            let splitter = BoundarySplitter::new(budget);
            for chunk in splitter.split(&text) {
                prop_assert!(
                    estimate_tokens(&chunk) <= budget || splitter.is_unsplittable(&chunk),
                    "chunk over budget: {:?}", chunk
                );
            }
        }
    }
}
