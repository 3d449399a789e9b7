//! Hand-written service doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use precis::{
    ChatTurn, ClassificationService, EmbeddingService, EngineConfig, MemoryBookSource,
    MemoryStore, PageIndexer, QuestionAnswering, ReadingTracker, Records, ServiceError,
    ServiceResult, SummarizationService, Summarizer, TranslationService,
};

/// Keeps the first `target` words of its input and counts calls.
#[derive(Default)]
pub struct Truncator {
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    hold: Mutex<Option<Hold>>,
}

struct Hold {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Truncator {
    /// Make the next call signal on the returned receiver, then wait (up to
    /// ten seconds) for a message on the returned sender.
    pub fn hold_next_call(&self) -> (Receiver<()>, Sender<()>) {
        let (entered, entered_rx) = mpsc::channel();
        let (release_tx, release) = mpsc::channel();
        *self.hold.lock().unwrap() = Some(Hold { entered, release });
        (entered_rx, release_tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SummarizationService for Truncator {
    fn summarize(&self, text: &str, target: usize, _hint: &str) -> ServiceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.entered.send(());
            let _ = hold.release.recv_timeout(Duration::from_secs(10));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("summarizer offline".into()));
        }
        Ok(text
            .split_whitespace()
            .take(target.max(1))
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Fixed label and tag list.
pub struct Labeler {
    pub label: &'static str,
    pub tags: &'static str,
}

impl ClassificationService for Labeler {
    fn classify(&self, _sample: &str) -> ServiceResult<String> {
        Ok(self.label.to_string())
    }

    fn extract_tags(&self, _text: &str) -> ServiceResult<String> {
        Ok(self.tags.to_string())
    }
}

/// Returns text unchanged.
pub struct Identity;

impl TranslationService for Identity {
    fn translate(&self, text: &str, _target_language: &str) -> ServiceResult<String> {
        Ok(text.to_string())
    }
}

/// Looks embeddings up by exact text; unknown text embeds to zeros.
#[derive(Default)]
pub struct TableEmbedder {
    pub vectors: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub fn with(mut self, text: &str, vector: [f32; 2]) -> Self {
        self.vectors.insert(text.to_string(), vector.to_vec());
        self
    }
}

impl EmbeddingService for TableEmbedder {
    fn embed(&self, text: &str) -> ServiceResult<Vec<f32>> {
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
    }
}

/// Unit vector whose cosine with `[1, 0]` is `score`.
pub fn at_cosine(score: f32) -> [f32; 2] {
    [score, (1.0 - score * score).sqrt()]
}

/// Echoes the question and the context it was given.
pub struct Echo;

impl QuestionAnswering for Echo {
    fn answer(&self, question: &str, context: &str, history: &[ChatTurn]) -> ServiceResult<String> {
        Ok(format!("{question} | {context} | {} turns", history.len()))
    }
}

/// Route engine logs to the test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with no retry delay and small summaries.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig {
        min_chunk_target_words: 1,
        summarize_concurrency: 2,
        ..EngineConfig::default()
    };
    config.retry.backoff_ms = 0;
    config.retry.max_attempts = 2;
    config
}

/// A book of `words` words, each 4 bytes plus a space, in sentences of ten.
pub fn book_text(words: usize) -> String {
    (0..words)
        .map(|i| {
            if i % 10 == 9 {
                format!("w{:03}.", i % 1000)
            } else {
                format!("w{:03}", i % 1000)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Everything needed to drive a reader through a book.
pub struct Harness {
    pub records: Arc<Records<MemoryStore>>,
    pub books: Arc<MemoryBookSource>,
    pub summarization: Arc<Truncator>,
    pub summarizer: Arc<Summarizer>,
    pub tracker: ReadingTracker<MemoryStore>,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        init_tracing();
        let records = Arc::new(Records::new(MemoryStore::new()));
        let books = Arc::new(MemoryBookSource::new());
        let summarization = Arc::new(Truncator::default());
        let summarizer = Arc::new(
            Summarizer::new(
                summarization.clone(),
                Arc::new(Labeler {
                    label: "novel",
                    tags: "Sea",
                }),
                &config,
            )
            .unwrap(),
        );
        let pages = PageIndexer::new(books.clone(), config.page_size);
        let tracker =
            ReadingTracker::new(records.clone(), pages, summarizer.clone(), config.clone());
        Self {
            records,
            books,
            summarization,
            summarizer,
            tracker,
            config,
        }
    }
}
