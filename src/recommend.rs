//! Catalog search against reader preferences.
//!
//! ## Pipeline
//!
//! ```text
//! catalog ─> drop already recommended ─> category ∩ preferences ─> sample ≤ cap
//!        ─> cosine(query, description) ─> drop ≤ 0 ─> stable sort desc ─> top k
//!        ─> append titles to history
//! ```
//!
//! The query is the compressed description of a book the reader chose
//! ([`Mode::History`]), the reader's own words ([`Mode::Input`]), or both
//! ([`Mode::Combined`]), in which case preferences are unioned and each
//! candidate keeps the better of its two scores.
//!
//! ## Sampling
//!
//! When more candidates pass the category filter than `candidate_cap`, a
//! uniform sample of `candidate_cap` is scored. The sample keeps catalog
//! order. Requests carrying a `request_id` seed the sampler from a SHA-256
//! digest of `(user, request_id)`, so repeating a request reproduces its
//! ranking, also across builds.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::EngineConfig;
use crate::preferences::{PreferenceExtractor, PreferenceSet};
use crate::services::{cosine_similarity, EmbeddingService, RetryPolicy};
use crate::store::{RecordStore, Records};
use crate::Result;

/// What a recommendation request is based on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// A previously read book's description.
    History {
        /// The book description.
        description: String,
    },
    /// Free text typed by the reader.
    Input {
        /// What the reader asked for.
        text: String,
    },
    /// Both of the above.
    Combined {
        /// What the reader asked for.
        text: String,
        /// The book description.
        description: String,
    },
}

/// A recommendation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Query source.
    pub mode: Mode,
    /// Skip titles recommended to this user before.
    pub exclude_history: bool,
    /// Seeds candidate sampling when set.
    pub request_id: Option<String>,
}

impl Request {
    /// A request that excludes history and samples unseeded.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            exclude_history: true,
            request_id: None,
        }
    }
}

/// A ranked catalog book.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// Catalog title.
    pub title: String,
    /// Catalog authors.
    pub authors: String,
    /// Catalog description.
    pub description: String,
    /// Cosine similarity to the query, in `(0, 1]`.
    pub score: f32,
}

impl Recommendation {
    fn scored(entry: &CatalogEntry, score: f32) -> Self {
        Self {
            title: entry.title.clone(),
            authors: entry.authors.clone(),
            description: entry.description.clone(),
            score,
        }
    }
}

/// Keep positive scores, sort by descending score, keep the first `top_k`.
///
/// The sort is stable, so equal scores stay in input order.
pub fn rank(mut scored: Vec<Recommendation>, top_k: usize) -> Vec<Recommendation> {
    scored.retain(|r| r.score > 0.0);
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored
}

/// Reduce `candidates` to at most `cap` items, uniformly, keeping order.
pub fn sample_candidates<T>(candidates: Vec<T>, cap: usize, rng: &mut StdRng) -> Vec<T> {
    if candidates.len() <= cap {
        return candidates;
    }
    let mut picked = rand::seq::index::sample(rng, candidates.len(), cap).into_vec();
    picked.sort_unstable();
    let mut picked = picked.into_iter().peekable();
    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            if picked.peek() == Some(&i) {
                picked.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

/// Seed for a request, stable across builds and platforms.
pub fn request_seed(user: &str, request_id: &str) -> [u8; 32] {
    let mut digest = Sha256::new();
    digest.update(user.as_bytes());
    digest.update([0u8]);
    digest.update(request_id.as_bytes());
    digest.finalize().into()
}

fn sampler(user: &str, request_id: Option<&str>) -> StdRng {
    match request_id {
        Some(id) => StdRng::from_seed(request_seed(user, id)),
        None => StdRng::from_entropy(),
    }
}

/// Scores catalog books against reader preferences.
pub struct Recommender<S> {
    records: Arc<Records<S>>,
    extractor: Arc<PreferenceExtractor>,
    embedding: Arc<dyn EmbeddingService>,
    catalog: Arc<Catalog>,
    retry: RetryPolicy,
    candidate_cap: usize,
    top_k: usize,
}

impl<S: RecordStore> Recommender<S> {
    /// Create a recommender over a catalog.
    pub fn new(
        records: Arc<Records<S>>,
        extractor: Arc<PreferenceExtractor>,
        embedding: Arc<dyn EmbeddingService>,
        catalog: Arc<Catalog>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            records,
            extractor,
            embedding,
            catalog,
            retry: config.retry.into(),
            candidate_cap: config.candidate_cap,
            top_k: config.top_k,
        }
    }

    /// Recommend up to `top_k` books and record them in the user's history.
    pub fn recommend(&self, user: &str, request: &Request) -> Result<Vec<Recommendation>> {
        let (preferences, queries) = self.preferences(&request.mode)?;

        let history = if request.exclude_history {
            self.records.read(user)?.recommendation_history
        } else {
            BTreeSet::new()
        };
        let candidates = self.candidates(&preferences, &history);
        let filtered = candidates.len();
        let mut rng = sampler(user, request.request_id.as_deref());
        let candidates = sample_candidates(candidates, self.candidate_cap, &mut rng);
        tracing::info!(
            user,
            filtered,
            scored = candidates.len(),
            tags = preferences.tags.len(),
            genres = preferences.genres.len(),
            "scoring candidates"
        );

        let query_vectors = queries
            .iter()
            .map(|q| self.embed(q))
            .collect::<Result<Vec<_>>>()?;
        let mut scored = Vec::with_capacity(candidates.len());
        for entry in candidates {
            let vector = self.embed(&entry.description)?;
            let score = query_vectors
                .iter()
                .map(|q| cosine_similarity(q, &vector))
                .fold(f32::NEG_INFINITY, f32::max);
            scored.push(Recommendation::scored(entry, score));
        }
        let ranked = rank(scored, self.top_k);

        self.records.update(user, |record| {
            record
                .recommendation_history
                .extend(ranked.iter().map(|r| r.title.clone()));
            Ok(())
        })?;
        tracing::info!(user, returned = ranked.len(), "recommendations ready");
        Ok(ranked)
    }

    fn preferences(&self, mode: &Mode) -> Result<(PreferenceSet, Vec<String>)> {
        match mode {
            Mode::History { description } => {
                let (compressed, prefs) = self.extractor.from_book_description(description)?;
                Ok((prefs, vec![compressed]))
            }
            Mode::Input { text } => {
                let prefs = self.extractor.from_free_text(text)?;
                Ok((prefs, vec![text.clone()]))
            }
            Mode::Combined { text, description } => {
                let input = self.extractor.from_free_text(text)?;
                let (compressed, history) = self.extractor.from_book_description(description)?;
                Ok((input.combine(&history), vec![text.clone(), compressed]))
            }
        }
    }

    fn candidates(
        &self,
        preferences: &PreferenceSet,
        history: &BTreeSet<String>,
    ) -> Vec<&CatalogEntry> {
        self.catalog
            .entries()
            .iter()
            .filter(|e| !history.contains(&e.title))
            .filter(|e| preferences.matches_category(&e.category))
            .collect()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let service = Arc::clone(&self.embedding);
        let text = text.to_string();
        Ok(self.retry.run("embed", move || service.embed(&text))?)
    }
}

impl<S> std::fmt::Debug for Recommender<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recommender")
            .field("catalog", &self.catalog.len())
            .field("candidate_cap", &self.candidate_cap)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}
