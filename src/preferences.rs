//! Tag and genre preferences.
//!
//! A [`PreferenceSet`] is what the recommender filters the catalog with. It
//! comes either from what the reader typed ("something about the sea, with
//! storms") or from the description of a book they already read.
//!
//! Tags come from the classification service. Genres come from a fixed
//! keyword scan so a flaky model never leaves the set empty: text matching no
//! keyword gets [`FALLBACK_GENRE`].

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::services::{ClassificationService, RetryPolicy, TranslationService};
use crate::summarize::Summarizer;
use crate::{Error, Result};

/// Genre assumed when no keyword matches.
pub const FALLBACK_GENRE: &str = "Fiction";

/// Genre labels and the case-folded keywords (English and Russian) that
/// select them.
const GENRE_KEYWORDS: [(&str, &[&str]); 4] = [
    ("Education", &["education", "textbook", "образование", "учебн"]),
    ("Popular Science", &["popular", "science", "наука", "популярн"]),
    ("Science", &["research", "theory", "исследован", "теори"]),
    ("Fiction", &["novel", "story", "fiction", "роман", "рассказ"]),
];

/// Tags and genres describing what a reader wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceSet {
    /// Single-word tags, capitalized.
    pub tags: BTreeSet<String>,
    /// Genre labels.
    pub genres: BTreeSet<String>,
}

impl PreferenceSet {
    /// Build a set from tag and genre lists.
    pub fn new<T, G>(tags: T, genres: G) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            genres: genres.into_iter().map(Into::into).collect(),
        }
    }

    /// Union of both sets' tags and of their genres.
    ///
    /// ```rust
    /// use precis::PreferenceSet;
    ///
    /// let a = PreferenceSet::new(["Sea"], ["roman"]);
    /// let b = PreferenceSet::new(["Sea", "Storm"], Vec::<String>::new());
    /// let both = a.combine(&b);
    ///
    /// assert_eq!(both, PreferenceSet::new(["Sea", "Storm"], ["roman"]));
    /// ```
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            tags: self.tags.union(&other.tags).cloned().collect(),
            genres: self.genres.union(&other.genres).cloned().collect(),
        }
    }

    /// Whether a catalog category mentions any tag or genre.
    ///
    /// Matching is by case-sensitive substring.
    pub fn matches_category(&self, category: &str) -> bool {
        self.tags
            .iter()
            .chain(self.genres.iter())
            .any(|needle| !needle.is_empty() && category.contains(needle.as_str()))
    }

    /// Whether there is nothing to filter by.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.genres.is_empty()
    }
}

/// Parse the classifier's comma-separated tag list.
///
/// Blank entries are dropped; each tag is trimmed and gets an uppercase first
/// letter with the rest lowercased.
pub fn parse_tags(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(capitalize)
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Genre labels whose keywords occur in `text`, or [`FALLBACK_GENRE`].
pub fn detect_genres(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut genres: BTreeSet<String> = GENRE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(genre, _)| (*genre).to_string())
        .collect();
    if genres.is_empty() {
        genres.insert(FALLBACK_GENRE.to_string());
    }
    genres
}

/// Derives [`PreferenceSet`]s through the translation and classification
/// services.
pub struct PreferenceExtractor {
    translation: Arc<dyn TranslationService>,
    classification: Arc<dyn ClassificationService>,
    summarizer: Arc<Summarizer>,
    retry: RetryPolicy,
    language: String,
    description_words: usize,
}

impl PreferenceExtractor {
    /// Create an extractor targeting the catalog language in `config`.
    pub fn new(
        translation: Arc<dyn TranslationService>,
        classification: Arc<dyn ClassificationService>,
        summarizer: Arc<Summarizer>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            translation,
            classification,
            summarizer,
            retry: config.retry.into(),
            language: config.catalog_language.clone(),
            description_words: config.default_target_words,
        }
    }

    /// Preferences from what the reader typed.
    ///
    /// The input is translated into the catalog language first; if translation
    /// fails the original text is used.
    pub fn from_free_text(&self, input: &str) -> Result<PreferenceSet> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Validation("preference text is empty".into()));
        }
        let service = Arc::clone(&self.translation);
        let (text, language) = (input.to_string(), self.language.clone());
        let translated = match self
            .retry
            .run("translate", move || service.translate(&text, &language))
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!("translation returned nothing, using input as is");
                input.to_string()
            }
            Err(err) => {
                tracing::warn!(error = %err, language = %self.language, "translation failed, using input as is");
                input.to_string()
            }
        };
        Ok(self.extract(&translated))
    }

    /// Preferences from a book description.
    ///
    /// Returns the compressed description too, so callers can score against
    /// it without compressing again.
    pub fn from_book_description(&self, description: &str) -> Result<(String, PreferenceSet)> {
        if description.trim().is_empty() {
            return Err(Error::Validation("book description is empty".into()));
        }
        let compressed = self
            .summarizer
            .compress(description, self.description_words, None)?;
        let preferences = self.extract(&compressed);
        Ok((compressed, preferences))
    }

    fn extract(&self, text: &str) -> PreferenceSet {
        let service = Arc::clone(&self.classification);
        let owned = text.to_string();
        let tags = match self
            .retry
            .run("extract_tags", move || service.extract_tags(&owned))
        {
            Ok(raw) => parse_tags(&raw),
            Err(err) => {
                tracing::warn!(error = %err, "tag extraction failed, continuing without tags");
                BTreeSet::new()
            }
        };
        let genres = detect_genres(text);
        tracing::debug!(tags = tags.len(), ?genres, "extracted preferences");
        PreferenceSet { tags, genres }
    }
}

impl std::fmt::Debug for PreferenceExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceExtractor")
            .field("language", &self.language)
            .field("description_words", &self.description_words)
            .finish_non_exhaustive()
    }
}
