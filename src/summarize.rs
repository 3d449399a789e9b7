//! Chunked recursive summarization.
//!
//! Text of any length is compressed to a word budget in two passes:
//!
//! ```text
//! text ──split──> [c0] [c1] [c2] ... [cn]        (≤ ceiling words each)
//!                   │    │    │        │          summarize(target / n)
//!                   v    v    v        v          (concurrently, ordered)
//!                 [s0] [s1] [s2] ... [sn]
//!                   └────┴─join─┴──────┘
//!                            │                   summarize(target)
//!                            v
//!                         summary
//! ```
//!
//! Chunking bounds the payload of every request sent to the summarization
//! service. Each chunk is summarized independently: no chunk sees another
//! chunk's output, so the calls run on a bounded thread pool and are
//! reassembled in source order.
//!
//! ## Per-chunk targets
//!
//! The per-chunk budget is `target / chunks`, floored. When there are more
//! chunks than target words this would be zero, so it is clamped to
//! [`EngineConfig::min_chunk_target_words`].

use std::sync::Arc;

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::services::{
    ClassificationService, RetryPolicy, ServiceError, SummarizationService,
};
use crate::{Chunker, Error, Result, SentenceChunker};

/// Characters taken on each side of the midpoint when classifying text.
const SAMPLE_RADIUS: usize = 500;

/// Broad kind of a text, used to steer what a summary keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextType {
    /// Fiction: plot, dialogue, characters.
    Narrative,
    /// Textbooks and manuals.
    Educational,
    /// Science written for a general audience.
    PopularScience,
    /// Research writing.
    Scientific,
    /// Anything else; carries the raw classifier label.
    Other(String),
}

impl TextType {
    /// Map a free-form classifier label onto a known type.
    ///
    /// Matching is by keyword and case-insensitive, in English and Russian.
    ///
    /// ```rust
    /// use precis::TextType;
    ///
    /// assert_eq!(TextType::from_label("Literary fiction"), TextType::Narrative);
    /// assert_eq!(TextType::from_label("научно-популярный"), TextType::PopularScience);
    /// assert_eq!(TextType::from_label("recipe"), TextType::Other("recipe".into()));
    /// ```
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        let has = |keys: &[&str]| keys.iter().any(|k| lower.contains(k));

        // Popular science before scientific: "научно-популярный" contains "научн".
        if has(&["popular", "популяр"]) {
            Self::PopularScience
        } else if has(&["scien", "research", "academic", "научн"]) {
            Self::Scientific
        } else if has(&["educat", "textbook", "tutorial", "technical", "учебн"]) {
            Self::Educational
        } else if has(&["literary", "fiction", "novel", "narrative", "story", "художеств"]) {
            Self::Narrative
        } else {
            Self::Other(label.trim().to_string())
        }
    }

    /// What the summarization service should emphasize for this type.
    pub fn domain_hint(&self) -> &'static str {
        match self {
            Self::Narrative => "plot, dialogues, characters",
            Self::Educational => "definitions, principles, examples",
            Self::PopularScience => "examples, application",
            Self::Scientific => "hypothesis, methods, conclusions",
            Self::Other(_) => "",
        }
    }
}

/// Take up to `SAMPLE_RADIUS` characters on each side of the midpoint.
pub fn midpoint_sample(text: &str) -> &str {
    let chars = text.chars().count();
    if chars == 0 {
        return text;
    }
    let mid = chars / 2;
    let from = mid.saturating_sub(SAMPLE_RADIUS);
    let to = (mid + SAMPLE_RADIUS).min(chars);

    let mut bounds = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()));
    let start = bounds.nth(from).unwrap_or(text.len());
    let end = bounds.nth(to - from - 1).unwrap_or(text.len());
    &text[start..end]
}

/// Compresses text through the summarization service.
pub struct Summarizer {
    summarization: Arc<dyn SummarizationService>,
    classification: Arc<dyn ClassificationService>,
    chunker: SentenceChunker,
    min_chunk_target: usize,
    retry: RetryPolicy,
    pool: rayon::ThreadPool,
}

impl Summarizer {
    /// Build a summarizer using the chunking and concurrency limits in `config`.
    pub fn new(
        summarization: Arc<dyn SummarizationService>,
        classification: Arc<dyn ClassificationService>,
        config: &EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.summarize_concurrency)
            .thread_name(|i| format!("precis-summarize-{i}"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            summarization,
            classification,
            chunker: SentenceChunker::new(config.chunk_word_ceiling),
            min_chunk_target: config.min_chunk_target_words,
            retry: config.retry.into(),
            pool,
        })
    }

    /// Classify `text` from a sample around its midpoint.
    ///
    /// Classifier failures and empty labels fall back to an untyped text.
    pub fn classify(&self, text: &str) -> TextType {
        let service = Arc::clone(&self.classification);
        let sample = midpoint_sample(text).to_string();
        match self.retry.run("classify", move || service.classify(&sample)) {
            Ok(label) if !label.trim().is_empty() => TextType::from_label(&label),
            Ok(_) => {
                tracing::warn!("classifier returned an empty label");
                TextType::Other(String::new())
            }
            Err(err) => {
                tracing::warn!(error = %err, "classification failed, using no domain hint");
                TextType::Other(String::new())
            }
        }
    }

    /// Compress `text` to roughly `target_words` words.
    ///
    /// When `text_type` is `None` the text is classified first. Text with no
    /// sentences is returned unchanged.
    pub fn compress(
        &self,
        text: &str,
        target_words: usize,
        text_type: Option<TextType>,
    ) -> Result<String> {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Ok(text.to_string());
        }

        let text_type = text_type.unwrap_or_else(|| self.classify(text));
        let hint = text_type.domain_hint();
        let target_words = target_words.max(1);
        let per_chunk = self.per_chunk_target(target_words, chunks.len());
        tracing::info!(
            chunks = chunks.len(),
            per_chunk,
            target_words,
            text_type = ?text_type,
            "compressing text"
        );

        let parts = self.pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| self.summarize_part(&chunk.text, per_chunk, hint))
                .collect::<Result<Vec<_>>>()
        })?;

        self.summarize_part(&parts.join(" "), target_words, hint)
    }

    /// Budget for each chunk, never below the configured minimum.
    pub fn per_chunk_target(&self, target_words: usize, chunks: usize) -> usize {
        let share = target_words / chunks.max(1);
        if share < self.min_chunk_target {
            tracing::debug!(share, min = self.min_chunk_target, "clamping per-chunk target");
        }
        share.max(self.min_chunk_target)
    }

    fn summarize_part(&self, text: &str, target_words: usize, hint: &'static str) -> Result<String> {
        let service = Arc::clone(&self.summarization);
        let text = text.to_string();
        self.retry
            .run("summarize", move || {
                let summary = service.summarize(&text, target_words, hint)?;
                if summary.trim().is_empty() {
                    Err(ServiceError::EmptyResponse)
                } else {
                    Ok(summary.trim().to_string())
                }
            })
            .map_err(|err| Error::Compression(err.to_string()))
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("chunker", &self.chunker)
            .field("min_chunk_target", &self.min_chunk_target)
            .field("retry", &self.retry)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}
