//! Reading progress and the running context.
//!
//! ## State machine
//!
//! ```text
//!               open (first time)            two numeric answers
//! NotOpened ───────────────────> PacingCollection ───────────────> Reading
//!     │                              │  invalid answer: re-prompt    ^  │
//!     │ open (pacing skipped)        └─── skip ──────────────────────┘  │
//!     └──────────────────────────────────────────────────────> Reading  │
//!                                                                       │
//!                           Reading <── leave ── ChattingWithAssistant <┘ enter
//! ```
//!
//! ## Summarization trigger
//!
//! Whenever the reader lands on a page that is a positive multiple of
//! `summary_interval` and the book has not been summarized up to that page,
//! the words of the pages read since the last trigger are compressed and
//! appended to the book's running context:
//!
//! ```text
//! interval = 50, words_per_page = 500
//!
//! page 50:  words [0, 25_000)        last_summarized_page = 50
//! page 100: words [25_000, 50_000)   last_summarized_page = 100
//! end:      words [50_000, end)      summarized_to_end = true
//! ```
//!
//! Ranges start where the previous one stopped, so together they are
//! contiguous and never overlap. Reaching the end of the book triggers a
//! final pass over whatever remains, regardless of the interval.
//!
//! A failed summarization does not block reading: the page move is saved,
//! `last_summarized_page` stays put, and the next trigger covers the missed
//! pages too.
//!
//! The page move is saved before the service is called, and the summary is
//! committed in a second critical section, so a slow summarizer never holds
//! the user's record lock. A summary is only committed if nothing else moved
//! `last_summarized_page` in the meantime; otherwise it is dropped as
//! [`SummaryOutcome::Superseded`].

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::pages::{Page, PageIndexer};
use crate::store::{BookRecord, RecordStore, Records, UserRecord};
use crate::summarize::Summarizer;
use crate::{Error, Result};

/// Where a reader is in the per-book state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Phase {
    /// Never opened.
    #[default]
    NotOpened,
    /// Waiting for pacing answers; holds the first answer once given.
    PacingCollection {
        /// Pages the reader plans per day, once answered.
        pages_per_day: Option<u32>,
    },
    /// Paging through the book.
    Reading,
    /// Talking to the assistant about the book.
    ChattingWithAssistant,
}

/// Persisted progress through one book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadingState {
    /// Zero-based page on screen.
    pub current_page: usize,
    /// Page count at the configured page size.
    pub total_pages: usize,
    /// Page up to which the running context covers the text.
    pub last_summarized_page: usize,
    /// Whether the tail of the book has been summarized.
    pub summarized_to_end: bool,
    /// Whether pacing collection has finished or been skipped.
    pub is_opened: bool,
    /// Whether this is the user's open reading session.
    pub is_session_active: bool,
    /// State-machine position.
    pub phase: Phase,
}

/// Reading schedule collected when a book is first opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pacing {
    /// Pages the reader plans per day.
    pub pages_per_day: u32,
    /// Days the reader has to finish.
    pub days_to_finish: u32,
    /// Summary size used for every trigger in this reading pass.
    pub target_words: usize,
}

impl Pacing {
    /// Derive the summary target: `days * pages_per_day * words_per_page / divisor`.
    ///
    /// ```rust
    /// use precis::Pacing;
    ///
    /// let pacing = Pacing::new(20, 10, 500, 6);
    /// assert_eq!(pacing.target_words, 16_666);
    /// ```
    pub fn new(pages_per_day: u32, days_to_finish: u32, words_per_page: usize, divisor: usize) -> Self {
        let target_words = (days_to_finish as usize)
            .saturating_mul(pages_per_day as usize)
            .saturating_mul(words_per_page)
            / divisor.max(1);
        Self {
            pages_per_day,
            days_to_finish,
            target_words,
        }
    }
}

/// Compressed summary of everything read so far, one segment per trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunningContext {
    segments: Vec<String>,
}

impl RunningContext {
    /// Append a segment.
    pub fn append(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    /// Segments in the order they were added.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether nothing has been summarized yet.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The context as one newline-separated text.
    pub fn as_text(&self) -> String {
        self.segments.join("\n")
    }

    /// Merge all segments into one of about `target_words` words once there
    /// are more than `max_segments`. Returns whether a merge happened.
    pub fn compact(
        &mut self,
        summarizer: &Summarizer,
        max_segments: usize,
        target_words: usize,
    ) -> Result<bool> {
        if self.segments.len() <= max_segments {
            return Ok(false);
        }
        let merged = summarizer.compress(&self.as_text(), target_words, None)?;
        tracing::info!(segments = self.segments.len(), target_words, "compacted running context");
        self.segments = vec![merged];
        Ok(true)
    }
}

/// A page as shown to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    /// Zero-based page index.
    pub index: usize,
    /// Page count of the book.
    pub total_pages: usize,
    /// Page contents.
    pub page: Page,
}

impl PageView {
    /// One-based position label, e.g. `"3/120"`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.index + 1, self.total_pages)
    }
}

/// Result of opening a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// First visit: ask how many pages per day the reader wants.
    AskPagesPerDay,
    /// Continue reading.
    Reading(PageView),
}

/// Which pacing question is being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingField {
    /// Pages per day.
    PagesPerDay,
    /// Days to finish.
    DaysToFinish,
}

/// Result of one pacing answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacingStep {
    /// Pages per day accepted; ask for days to finish.
    AskDaysToFinish,
    /// The answer was not a positive number; ask the same question again.
    Reprompt {
        /// The question to repeat.
        field: PacingField,
        /// Why the answer was rejected.
        reason: String,
    },
    /// Pacing complete; reading starts.
    Ready {
        /// The collected schedule.
        pacing: Pacing,
        /// The page to show.
        view: PageView,
    },
}

/// Where a navigation request left the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Moved to the page shown.
    Page(PageView),
    /// Already on the last page.
    EndOfBook,
    /// Already on the first page.
    FirstPage,
}

/// What the summarization trigger did during a navigation.
#[derive(Debug)]
pub enum SummaryOutcome {
    /// No trigger fired.
    NotDue,
    /// The given word range was compressed into the running context.
    Appended(Range<usize>),
    /// The trigger fired but compression failed; progress was still saved.
    Failed(Error),
    /// Another navigation committed a summary for this book first; this
    /// range was dropped.
    Superseded(Range<usize>),
}

/// Result of a forward or backward move.
#[derive(Debug)]
pub struct Navigation {
    /// Where the reader is now.
    pub step: Step,
    /// What the summarization trigger did.
    pub summary: SummaryOutcome,
}

/// Word range a trigger covers.
///
/// Starts at `last_summarized_page * words_per_page` and stops at
/// `current_page * words_per_page`, or at the end of the text when
/// `to_end` is set. Both ends are clamped to `total_words`.
pub fn summary_range(
    last_summarized_page: usize,
    current_page: usize,
    words_per_page: usize,
    total_words: usize,
    to_end: bool,
) -> Range<usize> {
    let start = last_summarized_page
        .saturating_mul(words_per_page)
        .min(total_words);
    let end = if to_end {
        total_words
    } else {
        current_page.saturating_mul(words_per_page).min(total_words)
    };
    start..end.max(start)
}

// Snapshot taken under the record lock when a trigger fires.
struct PendingSummary {
    from_page: usize,
    to_page: usize,
    to_end: bool,
    target_words: usize,
}

/// Drives the per-book reading state machine for every user.
pub struct ReadingTracker<S> {
    records: Arc<Records<S>>,
    pages: PageIndexer,
    summarizer: Arc<Summarizer>,
    config: EngineConfig,
}

impl<S: RecordStore> ReadingTracker<S> {
    /// Create a tracker over shared records, books, and summarizer.
    pub fn new(
        records: Arc<Records<S>>,
        pages: PageIndexer,
        summarizer: Arc<Summarizer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            records,
            pages,
            summarizer,
            config,
        }
    }

    /// Make sure a freshly uploaded book has a state entry.
    pub fn register_book(&self, user: &str, book: &str) -> Result<ReadingState> {
        let total_pages = self.pages.total_pages(user, book)?;
        self.records.update(user, |record| {
            let entry = record.books.entry(book.to_string()).or_default();
            entry.state.total_pages = total_pages;
            tracing::info!(user, book, total_pages, "registered book");
            Ok(entry.state.clone())
        })
    }

    /// Open a book, making it the user's only active session.
    pub fn open(&self, user: &str, book: &str) -> Result<OpenOutcome> {
        let total_pages = self.pages.total_pages(user, book)?;
        let reading = self.records.update(user, |record| {
            for (name, entry) in &mut record.books {
                entry.state.is_session_active = name == book;
            }
            let entry = record.books.entry(book.to_string()).or_default();
            let state = &mut entry.state;
            state.is_session_active = true;
            state.total_pages = total_pages;
            if state.is_opened {
                state.phase = Phase::Reading;
                Ok(Some(state.current_page))
            } else {
                state.phase = Phase::PacingCollection {
                    pages_per_day: None,
                };
                Ok(None)
            }
        })?;

        match reading {
            Some(index) => Ok(OpenOutcome::Reading(self.view(user, book, index, total_pages)?)),
            None => {
                tracing::info!(user, book, "first open, collecting pacing");
                Ok(OpenOutcome::AskPagesPerDay)
            }
        }
    }

    /// Feed one pacing answer.
    ///
    /// Non-numeric or zero answers re-prompt without changing state.
    pub fn submit_pacing(&self, user: &str, book: &str, input: &str) -> Result<PacingStep> {
        let config = &self.config;
        let step = self.records.update(user, |record| {
            let entry = record.book_mut(book)?;
            let Phase::PacingCollection { pages_per_day } = entry.state.phase else {
                return Err(Error::Validation(format!("book '{book}' is not collecting pacing")));
            };
            let field = if pages_per_day.is_some() {
                PacingField::DaysToFinish
            } else {
                PacingField::PagesPerDay
            };

            let answer = match parse_positive(input) {
                Ok(answer) => answer,
                Err(err) => {
                    tracing::debug!(user, book, ?field, error = %err, "re-prompting pacing");
                    return Ok(PacingStep::Reprompt {
                        field,
                        reason: err.to_string(),
                    });
                }
            };

            match pages_per_day {
                None => {
                    entry.state.phase = Phase::PacingCollection {
                        pages_per_day: Some(answer),
                    };
                    Ok(PacingStep::AskDaysToFinish)
                }
                Some(pages_per_day) => {
                    let pacing = Pacing::new(
                        pages_per_day,
                        answer,
                        config.words_per_page,
                        config.compression_divisor,
                    );
                    entry.pacing = Some(pacing);
                    entry.state.is_opened = true;
                    entry.state.phase = Phase::Reading;
                    tracing::info!(user, book, target_words = pacing.target_words, "pacing collected");
                    Ok(PacingStep::Ready {
                        pacing,
                        view: placeholder_view(&entry.state),
                    })
                }
            }
        })?;

        match step {
            PacingStep::Ready { pacing, view } => Ok(PacingStep::Ready {
                pacing,
                view: self.view(user, book, view.index, view.total_pages)?,
            }),
            other => Ok(other),
        }
    }

    /// Skip pacing collection and start reading with default summary sizes.
    pub fn skip_pacing(&self, user: &str, book: &str) -> Result<PageView> {
        let (index, total) = self.records.update(user, |record| {
            let state = &mut record.book_mut(book)?.state;
            state.is_opened = true;
            state.phase = Phase::Reading;
            Ok((state.current_page, state.total_pages))
        })?;
        self.view(user, book, index, total)
    }

    /// Move one page forward, firing the summarization trigger when due.
    pub fn advance(&self, user: &str, book: &str) -> Result<Navigation> {
        let config = &self.config;
        let (step, pending) = self.records.update(user, |record| {
            let entry = reading_entry(record, book)?;
            let target_words = entry
                .pacing
                .map(|p| p.target_words)
                .unwrap_or(config.fallback_summary_words);
            let state = &mut entry.state;

            let (step, due, to_end) = if state.current_page + 1 < state.total_pages {
                state.current_page += 1;
                let page = state.current_page;
                let due = page.checked_rem(config.summary_interval) == Some(0)
                    && state.last_summarized_page < page;
                (Step::Page(placeholder_view(state)), due, false)
            } else {
                let due = !state.summarized_to_end && state.total_pages > 0;
                (Step::EndOfBook, due, true)
            };

            let pending = due.then(|| PendingSummary {
                from_page: state.last_summarized_page,
                to_page: state.current_page,
                to_end,
                target_words,
            });
            Ok((step, pending))
        })?;

        let summary = match pending {
            Some(pending) => self.run_trigger(user, book, &pending)?,
            None => SummaryOutcome::NotDue,
        };
        let step = match step {
            Step::Page(view) => Step::Page(self.view(user, book, view.index, view.total_pages)?),
            other => other,
        };
        Ok(Navigation { step, summary })
    }

    /// Move one page back. Never triggers summarization.
    pub fn retreat(&self, user: &str, book: &str) -> Result<Navigation> {
        let moved = self.records.update(user, |record| {
            let state = &mut reading_entry(record, book)?.state;
            if state.current_page == 0 {
                return Ok(None);
            }
            state.current_page -= 1;
            Ok(Some((state.current_page, state.total_pages)))
        })?;

        let step = match moved {
            Some((index, total)) => Step::Page(self.view(user, book, index, total)?),
            None => Step::FirstPage,
        };
        Ok(Navigation {
            step,
            summary: SummaryOutcome::NotDue,
        })
    }

    /// Switch from reading to the assistant chat.
    pub fn enter_assistant(&self, user: &str, book: &str) -> Result<()> {
        self.records.update(user, |record| {
            reading_entry(record, book)?.state.phase = Phase::ChattingWithAssistant;
            Ok(())
        })
    }

    /// Leave the assistant chat and return to the active book's page.
    pub fn leave_assistant(&self, user: &str) -> Result<(String, PageView)> {
        let (book, index, total) = self.records.update(user, |record| {
            let (name, entry) = record
                .books
                .iter_mut()
                .find(|(_, entry)| entry.state.is_session_active)
                .ok_or_else(|| Error::NotFound(format!("active reading session for user '{user}'")))?;
            entry.state.phase = Phase::Reading;
            Ok((name.clone(), entry.state.current_page, entry.state.total_pages))
        })?;
        let view = self.view(user, &book, index, total)?;
        Ok((book, view))
    }

    /// End whatever reading session the user has open.
    pub fn close_session(&self, user: &str) -> Result<()> {
        self.records.update(user, |record| {
            for entry in record.books.values_mut() {
                entry.state.is_session_active = false;
            }
            Ok(())
        })
    }

    /// The book of the user's active session, if any.
    pub fn active_book(&self, user: &str) -> Result<Option<String>> {
        let record = self.records.read(user)?;
        Ok(record
            .books
            .into_iter()
            .find(|(_, entry)| entry.state.is_session_active)
            .map(|(name, _)| name))
    }

    /// Current state of a book.
    pub fn state(&self, user: &str, book: &str) -> Result<ReadingState> {
        Ok(self.records.read(user)?.book(book)?.state.clone())
    }

    /// The running context of a book as one text.
    pub fn running_context(&self, user: &str, book: &str) -> Result<String> {
        Ok(self.records.read(user)?.book(book)?.context.as_text())
    }

    // Runs without the record lock; commits only if the snapshot still holds.
    fn run_trigger(&self, user: &str, book: &str, pending: &PendingSummary) -> Result<SummaryOutcome> {
        let text = self.pages.full_text(user, book)?;
        let words: Vec<&str> = text.split_whitespace().collect();
        let range = summary_range(
            pending.from_page,
            pending.to_page,
            self.config.words_per_page,
            words.len(),
            pending.to_end,
        );

        let summary = if range.is_empty() {
            None
        } else {
            let slice = words[range.clone()].join(" ");
            match self.summarizer.compress(&slice, pending.target_words, None) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    tracing::warn!(user, book, error = %err, ?range, "summarization trigger failed");
                    return Ok(SummaryOutcome::Failed(err));
                }
            }
        };

        let max_segments = self.config.context_max_segments;
        let committed = self.records.update(user, |record| {
            let entry = record.book_mut(book)?;
            let state = &mut entry.state;
            if state.last_summarized_page != pending.from_page
                || (pending.to_end && state.summarized_to_end)
            {
                return Ok(None);
            }
            state.last_summarized_page = state.last_summarized_page.max(pending.to_page);
            if pending.to_end {
                state.summarized_to_end = true;
            }
            if let Some(summary) = summary {
                entry.context.append(summary);
            }
            Ok(Some(
                (entry.context.len() > max_segments).then(|| entry.context.clone()),
            ))
        })?;

        let Some(overfull) = committed else {
            tracing::info!(user, book, ?range, "summary superseded by a concurrent trigger");
            return Ok(SummaryOutcome::Superseded(range));
        };
        tracing::info!(user, book, ?range, page = pending.to_page, "summarization trigger fired");
        if let Some(context) = overfull {
            self.compact_context(user, book, context);
        }
        Ok(SummaryOutcome::Appended(range))
    }

    // Compresses outside the lock; the result replaces the stored context only
    // if no segment was appended meanwhile. Failures keep the segments.
    fn compact_context(&self, user: &str, book: &str, context: RunningContext) {
        let mut compacted = context.clone();
        if let Err(err) = compacted.compact(
            &self.summarizer,
            self.config.context_max_segments,
            self.config.context_target_words,
        ) {
            tracing::warn!(user, book, error = %err, "running context compaction failed");
            return;
        }
        let stored = self.records.update(user, |record| {
            let entry = record.book_mut(book)?;
            let unchanged = entry.context == context;
            if unchanged {
                entry.context = compacted;
            }
            Ok(unchanged)
        });
        match stored {
            Ok(true) => {}
            Ok(false) => tracing::debug!(user, book, "context changed during compaction, keeping segments"),
            Err(err) => tracing::warn!(user, book, error = %err, "storing compacted context failed"),
        }
    }

    fn view(&self, user: &str, book: &str, index: usize, total_pages: usize) -> Result<PageView> {
        Ok(PageView {
            index,
            total_pages,
            page: self.pages.page(user, book, index)?,
        })
    }
}

fn reading_entry<'a>(record: &'a mut UserRecord, book: &str) -> Result<&'a mut BookRecord> {
    let entry = record.book_mut(book)?;
    if entry.state.phase != Phase::Reading {
        return Err(Error::Validation(format!(
            "book '{book}' is not being read (phase {:?})",
            entry.state.phase
        )));
    }
    Ok(entry)
}

// Page text is filled in after the record lock is released.
fn placeholder_view(state: &ReadingState) -> PageView {
    PageView {
        index: state.current_page,
        total_pages: state.total_pages,
        page: Page::EndOfBook,
    }
}

fn parse_positive(input: &str) -> Result<u32> {
    match input.trim().parse::<u32>() {
        Ok(0) => Err(Error::Validation("expected a number greater than zero".into())),
        Ok(n) => Ok(n),
        Err(_) => Err(Error::Validation(format!("'{}' is not a number", input.trim()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_target() {
        assert_eq!(Pacing::new(20, 10, 500, 6).target_words, 16_666);
        assert_eq!(Pacing::new(1, 1, 5, 6).target_words, 0);
    }

    #[test]
    fn test_summary_range_interval() {
        assert_eq!(summary_range(0, 50, 500, 100_000, false), 0..25_000);
        assert_eq!(summary_range(50, 100, 500, 100_000, false), 25_000..50_000);
    }

    #[test]
    fn test_summary_range_to_end_and_clamped() {
        assert_eq!(summary_range(100, 120, 500, 55_000, true), 50_000..55_000);
        assert_eq!(summary_range(200, 250, 500, 55_000, false), 55_000..55_000);
    }

    #[test]
    fn test_parse_positive() {
        assert_eq!(parse_positive(" 12 ").unwrap(), 12);
        assert!(parse_positive("twelve").is_err());
        assert!(parse_positive("0").is_err());
        assert!(parse_positive("-3").is_err());
    }

    #[test]
    fn test_context_text_joins_segments() {
        let mut context = RunningContext::default();
        assert!(context.is_empty());
        context.append("first");
        context.append("second");
        assert_eq!(context.as_text(), "first\nsecond");
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_phase_serializes_tagged() {
        let phase = Phase::PacingCollection {
            pages_per_day: Some(3),
        };
        let json = serde_json::to_string(&phase).unwrap();
        assert_eq!(json, r#"{"kind":"pacing_collection","pages_per_day":3}"#);
        assert_eq!(serde_json::from_str::<Phase>(&json).unwrap(), phase);
    }
}
