//! The Passage type: a span of book text with its word count.

/// A contiguous run of sentences cut from a larger text.
///
/// Passages are the unit sent to the summarization service. `text` is the
/// normalized form (sentences joined by single spaces, each ending in
/// terminal punctuation), while `start`/`end` point back into the source.
///
/// ## Byte Offsets
///
/// `start` and `end` are byte offsets into the source text, matching Rust's
/// slicing semantics:
///
/// ```rust
/// use precis::Passage;
///
/// let source = "Call me Ishmael. Some years ago.";
/// let passage = Passage::new("Some years ago.", 17, 32, 1);
///
/// assert_eq!(&source[passage.span()], "Some years ago.");
/// assert_eq!(passage.words, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    /// The normalized passage text.
    pub text: String,
    /// Byte offset where this passage starts in the source.
    pub start: usize,
    /// Byte offset where this passage ends (exclusive) in the source.
    pub end: usize,
    /// Zero-based position of this passage in the sequence.
    pub index: usize,
    /// Whitespace-delimited words in `text`.
    pub words: usize,
}

impl Passage {
    /// Create a new passage, counting its words.
    #[must_use]
    pub fn new(text: impl Into<String>, start: usize, end: usize, index: usize) -> Self {
        let text = text.into();
        let words = word_count(&text);
        Self {
            text,
            start,
            end,
            index,
            words,
        }
    }

    /// The length of this passage in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether this passage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The byte span of this passage in the source.
    #[must_use]
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl std::fmt::Display for Passage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Passage {{ index: {}, span: {}..{}, words: {} }}",
            self.index, self.start, self.end, self.words
        )
    }
}

/// Count whitespace-delimited words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
