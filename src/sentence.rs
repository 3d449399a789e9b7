//! Sentence splitting and word-budget packing.
//!
//! Text headed for the summarization service is cut on sentence boundaries
//! and packed greedily into passages whose word count stays near a ceiling.
//!
//! ## Finding Sentences
//!
//! We use Unicode Standard Annex #29 (UAX #29) sentence segmentation, which
//! copes with abbreviations, decimals, and ellipses better than splitting on
//! `". "`. Paragraph breaks also end a sentence, so headings and verse lines
//! come out as sentences of their own.
//!
//! Sentences that do not end in terminal punctuation get a `.` appended so
//! the service always sees complete sentences.
//!
//! ## Packing
//!
//! ```text
//! ceiling = 8 words
//!
//! [5 words] [4 words] | [6 words] [3 words] | [2 words]
//!  running: 5 -> 9 >= 8, close    6 -> 9, close   remainder
//! ```
//!
//! A chunk closes as soon as its running word count reaches the ceiling, so
//! a chunk exceeds the ceiling by at most one sentence. The non-empty
//! remainder becomes a final, possibly short, chunk.

use unicode_segmentation::UnicodeSegmentation;

use crate::passage::word_count;
use crate::{Chunker, Passage};

const TERMINAL: [char; 6] = ['.', '!', '?', '…', '。', ';'];
const CLOSERS: [char; 7] = ['"', '\'', ')', ']', '»', '”', '’'];

/// A single sentence with its source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Trimmed sentence text, always ending in terminal punctuation.
    pub text: String,
    /// Byte offset of the trimmed sentence in the source.
    pub start: usize,
    /// Byte offset one past the trimmed sentence in the source.
    pub end: usize,
}

/// Split `text` into trimmed sentences, normalizing terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut offset = 0;

    for raw in text.split_sentence_bounds() {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let leading_ws = raw.len() - raw.trim_start().len();
            let start = offset + leading_ws;
            sentences.push(Sentence {
                text: with_terminal_punctuation(trimmed),
                start,
                end: start + trimmed.len(),
            });
        }
        offset += raw.len();
    }

    sentences
}

fn with_terminal_punctuation(sentence: &str) -> String {
    let core = sentence.trim_end_matches(CLOSERS);
    if core.ends_with(TERMINAL) {
        sentence.to_string()
    } else {
        format!("{sentence}.")
    }
}

/// Greedy sentence packer bounded by a word ceiling.
///
/// ## Example
///
/// ```rust
/// use precis::{Chunker, SentenceChunker};
///
/// let chunker = SentenceChunker::new(4);
/// let text = "One two three. Four five. Six";
/// let passages = chunker.chunk(text);
///
/// assert_eq!(passages.len(), 2);
/// assert_eq!(passages[0].text, "One two three. Four five.");
/// assert_eq!(passages[1].text, "Six.");
/// ```
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    word_ceiling: usize,
}

impl SentenceChunker {
    /// Create a new sentence chunker.
    ///
    /// # Panics
    ///
    /// Panics if `word_ceiling == 0`.
    #[must_use]
    pub fn new(word_ceiling: usize) -> Self {
        assert!(word_ceiling > 0, "word_ceiling must be > 0");
        Self { word_ceiling }
    }

    /// The word count at which a chunk closes.
    #[must_use]
    pub fn word_ceiling(&self) -> usize {
        self.word_ceiling
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<Passage> {
        let sentences = split_sentences(text);
        let mut passages = Vec::with_capacity(self.estimate_chunks(text.len()));
        let mut current: Vec<&Sentence> = Vec::new();
        let mut current_words = 0;

        for sentence in &sentences {
            current.push(sentence);
            current_words += word_count(&sentence.text);
            if current_words >= self.word_ceiling {
                flush(&mut current, &mut passages);
                current_words = 0;
            }
        }
        flush(&mut current, &mut passages);

        passages
    }

    fn estimate_chunks(&self, text_len: usize) -> usize {
        // Rough estimate: ~6 bytes per word
        (text_len / 6 / self.word_ceiling).max(1)
    }
}

fn flush(group: &mut Vec<&Sentence>, passages: &mut Vec<Passage>) {
    if let (Some(first), Some(last)) = (group.first(), group.last()) {
        let joined = group
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let index = passages.len();
        passages.push(Passage::new(joined, first.start, last.end, index));
    }
    group.clear();
}
