//! Contracts for the external collaborators.
//!
//! Language-model inference, translation, and embedding live outside this
//! crate. Each is a blocking trait object so any backend (HTTP client, local
//! model, test double) can be plugged in. All calls are I/O bound and may
//! fail transiently; [`RetryPolicy`] wraps them.
//!
//! A policy with a deadline runs each attempt on its own thread and stops
//! waiting when the deadline passes, reporting [`ServiceError::Timeout`],
//! which is retried like any other transient failure. The abandoned call
//! finishes in the background and its result is discarded.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::RetryConfig;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the call because of rate limits.
    #[error("rate limited")]
    RateLimited,

    /// The call did not complete in time.
    #[error("timed out")]
    Timeout,

    /// The service answered with no usable content.
    #[error("empty response")]
    EmptyResponse,

    /// The service answered with content that cannot be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

/// Result of a single collaborator call.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Text-type classification and tag extraction.
pub trait ClassificationService: Send + Sync {
    /// Label the kind of text a sample comes from (e.g. "literary").
    fn classify(&self, sample: &str) -> ServiceResult<String>;

    /// Extract comma-separated single-word tags describing `text`.
    fn extract_tags(&self, text: &str) -> ServiceResult<String>;
}

/// Machine translation.
pub trait TranslationService: Send + Sync {
    /// Translate `text` into `target_language` (an ISO 639-1 code).
    fn translate(&self, text: &str, target_language: &str) -> ServiceResult<String>;
}

/// Abstractive summarization.
pub trait SummarizationService: Send + Sync {
    /// Summarize `text` to roughly `target_words` words, emphasizing the
    /// aspects named in `domain_hint` (may be empty).
    fn summarize(&self, text: &str, target_words: usize, domain_hint: &str)
        -> ServiceResult<String>;
}

/// Sentence embeddings.
pub trait EmbeddingService: Send + Sync {
    /// Embed `text` into a dense vector.
    fn embed(&self, text: &str) -> ServiceResult<Vec<f32>>;
}

/// Answers free-form questions about a book.
pub trait QuestionAnswering: Send + Sync {
    /// Answer `question` given the book's running context and prior turns.
    fn answer(&self, question: &str, context: &str, history: &[ChatTurn])
        -> ServiceResult<String>;
}

/// One prior exchange in an assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// What the reader asked.
    pub question: String,
    /// What the assistant replied.
    pub answer: String,
}

/// Compute cosine similarity between two embeddings.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Bounded retry with linear backoff and an optional per-call deadline.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Create a policy without a deadline. `max_attempts` is clamped to at
    /// least one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            timeout: None,
        }
    }

    /// A policy that tries exactly once.
    #[must_use]
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Give up on any single attempt after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The per-attempt deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `call`, retrying transient failures.
    ///
    /// `what` names the operation in log output. The call owns its inputs so
    /// an attempt that overruns the deadline can be left behind.
    pub fn run<T, F>(&self, what: &str, call: F) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: Fn() -> ServiceResult<T> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let mut attempt = 1;
        loop {
            match self.attempt(what, &call) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(operation = what, attempt, error = %err, "service call failed, retrying");
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn attempt<T, F>(&self, what: &str, call: &Arc<F>) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: Fn() -> ServiceResult<T> + Send + Sync + 'static,
    {
        let Some(timeout) = self.timeout else {
            return (**call)();
        };
        let (tx, rx) = mpsc::sync_channel(1);
        let worker = Arc::clone(call);
        thread::Builder::new()
            .name(format!("precis-{what}"))
            .spawn(move || {
                // The receiver is gone when the deadline already passed.
                let _ = tx.send((*worker)());
            })
            .map_err(|e| ServiceError::Unavailable(format!("cannot spawn call: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(operation = what, ?timeout, "service call exceeded its deadline");
                Err(ServiceError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ServiceError::Unavailable(format!("{what} call panicked")))
            }
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        let policy = Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms));
        match config.timeout_ms {
            0 => policy,
            ms => policy.with_timeout(Duration::from_millis(ms)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}
