//! # precis
//!
//! Progressive compression of books as they are read, and preference-based
//! book recommendations.
//!
//! ## The Problem
//!
//! A reader has a long book and a schedule. They want to page through it,
//! ask questions about what they've read so far, and get a condensed memory
//! of earlier chapters that stays small enough to hand to a language model.
//! Later they want "more books like this one".
//!
//! Two things make this awkward:
//!
//! - Summarization services take bounded input. A 500-page novel doesn't fit.
//! - The reader moves through the book over days, from several sessions,
//!   and the summary has to keep up without re-reading everything.
//!
//! ## Pieces
//!
//! ```text
//!  BookSource ──> PageIndexer ──> ReadingTracker ──trigger──> Summarizer
//!                                      │                          │
//!                                      v                          v
//!                               RecordStore <──────────── RunningContext
//!                                      ^                          │
//!                                      │                          v
//!  Catalog ──> Recommender <── PreferenceExtractor            Assistant
//! ```
//!
//! ### Paging
//!
//! Pages are fixed byte windows over the uploaded file ([`PageIndexer`]). The
//! page count depends only on the file size, so it never changes between
//! sessions.
//!
//! ### Chunked summarization
//!
//! [`Summarizer::compress`] cuts text on sentence boundaries into chunks of
//! about [`EngineConfig::chunk_word_ceiling`] words, summarizes every chunk
//! concurrently, then summarizes the concatenation down to the final size.
//!
//! ```text
//! "It was a dark night. The ship..." (40 000 words)
//!    │ SentenceChunker (≤ 500 words)
//!    v
//! [chunk 0] [chunk 1] ... [chunk 79]   -> 80 × summarize(target / 80)
//!    │ join in order
//!    v
//! summarize(target)                     -> running context segment
//! ```
//!
//! ### Progress tracking
//!
//! [`ReadingTracker`] keeps the per-book state machine. Every 50 pages (and
//! at the end of the book) the pages read since the last trigger are
//! compressed and appended to the book's [`RunningContext`].
//!
//! ### Recommendations
//!
//! [`Recommender`] filters the [`Catalog`] by tag and genre overlap, scores
//! what's left by embedding similarity, and returns the top five, skipping
//! anything recommended before.
//!
//! ## Quick Start
//!
//! ```rust
//! use precis::{Chunker, SentenceChunker, total_pages};
//!
//! let text = "The quick brown fox jumps over the lazy dog. \
//!             Pack my box with five dozen liquor jugs";
//!
//! let chunker = SentenceChunker::new(5);
//! let passages = chunker.chunk(text);
//! assert_eq!(passages.len(), 2);
//! assert!(passages[1].text.ends_with("jugs."));
//!
//! assert_eq!(total_pages(text.len() as u64, 1000), 1);
//! ```
//!
//! ## Services
//!
//! Models live elsewhere. Plug them in through [`SummarizationService`],
//! [`ClassificationService`], [`TranslationService`], [`EmbeddingService`],
//! and [`QuestionAnswering`]. Calls are blocking and retried by
//! [`RetryPolicy`].
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber.

mod assistant;
mod catalog;
mod config;
mod error;
mod pages;
mod passage;
mod preferences;
mod progress;
mod recommend;
mod sentence;
mod services;
mod store;
mod summarize;

pub use assistant::{AnswerLength, Assistant};
pub use catalog::{Catalog, CatalogEntry};
pub use config::{EngineConfig, RetryConfig};
pub use error::{Error, Result};
pub use pages::{decode_text, is_pdf, page_of, total_pages, Page, PageIndexer};
pub use passage::{word_count, Passage};
pub use preferences::{
    detect_genres, parse_tags, PreferenceExtractor, PreferenceSet, FALLBACK_GENRE,
};
pub use progress::{
    summary_range, Navigation, OpenOutcome, PacingField, PacingStep, Pacing, PageView, Phase,
    ReadingState, ReadingTracker, RunningContext, Step, SummaryOutcome,
};
pub use recommend::{
    rank, request_seed, sample_candidates, Mode, Recommendation, Recommender, Request,
};
pub use sentence::{split_sentences, Sentence, SentenceChunker};
pub use services::{
    cosine_similarity, ChatTurn, ClassificationService, EmbeddingService, QuestionAnswering,
    RetryPolicy, ServiceError, ServiceResult, SummarizationService, TranslationService,
};
pub use store::{
    BookRecord, BookSource, FsBookSource, JsonFileStore, MemoryBookSource, MemoryStore,
    RecordStore, Records, UserRecord,
};
pub use summarize::{midpoint_sample, Summarizer, TextType};

/// A strategy for cutting text into passages.
///
/// ```rust
/// use precis::{Chunker, Passage, SentenceChunker};
///
/// fn chunk_document(chunker: &dyn Chunker, text: &str) -> Vec<Passage> {
///     chunker.chunk(text)
/// }
///
/// let passages = chunk_document(&SentenceChunker::new(500), "Hello world. This is a test.");
/// assert_eq!(passages.len(), 1);
/// ```
pub trait Chunker: Send + Sync {
    /// Split text into passages.
    ///
    /// Each [`Passage`] carries its normalized text and the byte offsets it
    /// came from in the original.
    fn chunk(&self, text: &str) -> Vec<Passage>;

    /// Estimate the number of passages for a given text length.
    ///
    /// Useful for pre-allocation. May be approximate.
    fn estimate_chunks(&self, text_len: usize) -> usize {
        // Conservative default
        (text_len / 500).max(1)
    }
}
