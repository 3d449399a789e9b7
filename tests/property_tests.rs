//! Property-based tests for paging, packing, preferences, and ranking.
//!
//! These tests verify invariants that must hold for any input:
//! - Paging: page counts are monotonic and pages tile the text
//! - Packing: passages keep every word, in order
//! - Preferences: combining is a set union
//! - Ranking: output is sorted, short, and positive
//! - Triggers: summarized word ranges are contiguous

use std::collections::BTreeSet;

use proptest::prelude::*;
use precis::{
    page_of, rank, summary_range, total_pages, Chunker, Page, Passage, PreferenceSet,
    Recommendation, SentenceChunker,
};

// =============================================================================
// Test Generators
// =============================================================================

/// Generate text with sentence-like structure
fn sentence_like_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::string::string_regex("[A-Za-z]{2,15}").unwrap(), 1..80).prop_map(
        |words| {
            let mut result = String::new();
            for (i, word) in words.iter().enumerate() {
                result.push_str(word);
                if i % 5 == 4 {
                    result.push_str(". ");
                } else {
                    result.push(' ');
                }
            }
            result
        },
    )
}

fn word_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(prop::string::string_regex("[A-Z][a-z]{1,8}").unwrap(), 0..6)
}

fn preference_set() -> impl Strategy<Value = PreferenceSet> {
    (word_set(), word_set()).prop_map(|(tags, genres)| PreferenceSet { tags, genres })
}

// =============================================================================
// Invariant Helpers
// =============================================================================

/// Words with terminal periods stripped, for comparison modulo normalization.
fn bare_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_end_matches('.').to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Check that passages are in source order and do not overlap
fn passages_ordered(passages: &[Passage]) -> bool {
    passages.windows(2).all(|w| w[0].end <= w[1].start)
}

// =============================================================================
// Paging
// =============================================================================

proptest! {
    #[test]
    fn total_pages_monotonic(a in 0u64..1_000_000, b in 0u64..1_000_000, size in 1usize..5000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(total_pages(lo, size) <= total_pages(hi, size));
    }

    #[test]
    fn total_pages_zero_iff_empty(len in 0u64..1_000_000, size in 1usize..5000) {
        prop_assert_eq!(total_pages(len, size) == 0, len == 0);
    }

    #[test]
    fn pages_tile_text(text in "\\PC{0,300}", size in 1usize..64) {
        let mut rebuilt = String::new();
        for index in 0..total_pages(text.len() as u64, size) {
            if let Page::Text(page) = page_of("t", text.as_bytes(), index, size).unwrap() {
                rebuilt.push_str(&page);
            }
        }
        prop_assert_eq!(rebuilt, text);
    }
}

// =============================================================================
// Packing
// =============================================================================

proptest! {
    #[test]
    fn packing_keeps_every_word(text in sentence_like_text(), ceiling in 1usize..40) {
        let passages = SentenceChunker::new(ceiling).chunk(&text);
        let rejoined = passages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join(" ");
        prop_assert_eq!(bare_words(&rejoined), bare_words(&text));
    }

    #[test]
    fn packing_fills_all_but_last(text in sentence_like_text(), ceiling in 1usize..40) {
        let passages = SentenceChunker::new(ceiling).chunk(&text);
        for passage in passages.iter().take(passages.len().saturating_sub(1)) {
            prop_assert!(passage.words >= ceiling);
        }
        prop_assert!(passages_ordered(&passages));
    }

    #[test]
    fn passage_spans_are_in_bounds(text in sentence_like_text(), ceiling in 1usize..40) {
        for passage in SentenceChunker::new(ceiling).chunk(&text) {
            prop_assert!(passage.start <= passage.end && passage.end <= text.len());
        }
    }
}

// =============================================================================
// Preferences
// =============================================================================

proptest! {
    #[test]
    fn combine_is_idempotent(a in preference_set(), b in preference_set()) {
        let once = a.combine(&b);
        prop_assert_eq!(once.combine(&b), once.clone());
        prop_assert_eq!(b.combine(&a), once);
    }
}

// =============================================================================
// Ranking
// =============================================================================

proptest! {
    #[test]
    fn ranking_sorted_and_bounded(
        scores in prop::collection::vec(-1.0f32..1.0, 0..30),
        history in prop::collection::btree_set(0usize..30, 0..10),
    ) {
        let scored: Vec<Recommendation> = scores
            .iter()
            .enumerate()
            .filter(|(i, _)| !history.contains(i))
            .map(|(i, &score)| Recommendation {
                title: i.to_string(),
                authors: String::new(),
                description: String::new(),
                score,
            })
            .collect();
        let ranked = rank(scored, 5);

        prop_assert!(ranked.len() <= 5);
        prop_assert!(ranked.iter().all(|r| r.score > 0.0));
        prop_assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        for r in &ranked {
            let index: usize = r.title.parse().unwrap();
            prop_assert!(!history.contains(&index));
        }
    }
}

// =============================================================================
// Summarization triggers
// =============================================================================

proptest! {
    #[test]
    fn trigger_ranges_contiguous(
        total in 1usize..400,
        interval in 1usize..60,
        words_per_page in 1usize..600,
        total_words in 0usize..200_000,
    ) {
        let mut last = 0;
        let mut ranges = Vec::new();
        for current in 1..total {
            if current % interval == 0 && last < current {
                ranges.push(summary_range(last, current, words_per_page, total_words, false));
                last = current;
            }
            prop_assert!(last <= current);
        }
        ranges.push(summary_range(last, total - 1, words_per_page, total_words, true));

        prop_assert_eq!(ranges[0].start, 0);
        prop_assert_eq!(ranges.last().unwrap().end, total_words);
        for pair in ranges.windows(2) {
            prop_assert_eq!(pair[0].end, pair[1].start);
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn thousand_byte_book() {
    assert_eq!(total_pages(1000, 1000), 1);
    assert_eq!(total_pages(1000, 999), 2);
}

#[test]
fn combine_scenario() {
    let a = PreferenceSet::new(["Sea"], ["roman"]);
    let b = PreferenceSet::new(["Sea", "Storm"], Vec::<String>::new());
    assert_eq!(a.combine(&b), PreferenceSet::new(["Sea", "Storm"], ["roman"]));
}

#[test]
fn packing_is_deterministic() {
    let text = "The quick brown fox jumps over the lazy dog. Pack my box.";
    let chunker = SentenceChunker::new(4);
    assert_eq!(chunker.chunk(text), chunker.chunk(text));
}
