//! Questions about the book being read.
//!
//! The assistant answers from the book's running context, never from the raw
//! text, so it only knows what the reader has already been through. Short and
//! medium answers are the full answer compressed down to a word budget.

use std::sync::Arc;

use crate::services::{ChatTurn, QuestionAnswering, RetryPolicy, ServiceError};
use crate::store::{RecordStore, Records};
use crate::summarize::Summarizer;
use crate::{Error, Result};

/// How long an answer should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnswerLength {
    /// About 50 words.
    Short,
    /// About 100 words.
    Medium,
    /// Whatever the service returns.
    #[default]
    Detailed,
}

impl AnswerLength {
    /// Word budget, or `None` for uncompressed answers.
    pub fn word_budget(self) -> Option<usize> {
        match self {
            Self::Short => Some(50),
            Self::Medium => Some(100),
            Self::Detailed => None,
        }
    }
}

/// Answers reader questions through a [`QuestionAnswering`] service.
pub struct Assistant<S> {
    records: Arc<Records<S>>,
    answering: Arc<dyn QuestionAnswering>,
    summarizer: Arc<Summarizer>,
    retry: RetryPolicy,
}

impl<S: RecordStore> Assistant<S> {
    /// Create an assistant.
    pub fn new(
        records: Arc<Records<S>>,
        answering: Arc<dyn QuestionAnswering>,
        summarizer: Arc<Summarizer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            records,
            answering,
            summarizer,
            retry,
        }
    }

    /// Answer `question` about `book` given the conversation so far.
    pub fn ask(
        &self,
        user: &str,
        book: &str,
        question: &str,
        length: AnswerLength,
        history: &[ChatTurn],
    ) -> Result<String> {
        if question.trim().is_empty() {
            return Err(Error::Validation("question is empty".into()));
        }
        let context = self.records.read(user)?.book(book)?.context.as_text();
        tracing::debug!(user, book, context_len = context.len(), turns = history.len(), "asking assistant");

        let service = Arc::clone(&self.answering);
        let (question, history) = (question.to_string(), history.to_vec());
        let answer = self.retry.run("answer", move || {
            let answer = service.answer(&question, &context, &history)?;
            if answer.trim().is_empty() {
                Err(ServiceError::EmptyResponse)
            } else {
                Ok(answer)
            }
        })?;

        match length.word_budget() {
            Some(words) => self.summarizer.compress(&answer, words, None),
            None => Ok(answer),
        }
    }
}

impl<S> std::fmt::Debug for Assistant<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
