//! Engine policy constants.
//!
//! Every tunable lives in [`EngineConfig`], loaded from a TOML file. Missing
//! keys fall back to the defaults below, so an empty file is a valid config.
//!
//! ```toml
//! page_size = 1000
//! words_per_page = 500
//! summary_interval = 50
//!
//! [retry]
//! max_attempts = 3
//! backoff_ms = 200
//! timeout_ms = 60000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Policy constants for paging, summarization, and ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bytes per page of raw book text.
    pub page_size: usize,
    /// Words attributed to one page when slicing text for summaries.
    pub words_per_page: usize,
    /// Pages between summarization triggers.
    pub summary_interval: usize,
    /// Assumed compression ratio applied to the pacing target.
    pub compression_divisor: usize,
    /// Word ceiling at which a chunk is closed.
    pub chunk_word_ceiling: usize,
    /// Smallest per-chunk target ever requested from the summarizer.
    pub min_chunk_target_words: usize,
    /// Target size for book descriptions and other ad hoc compressions.
    pub default_target_words: usize,
    /// Trigger target when the reader skipped pacing collection.
    pub fallback_summary_words: usize,
    /// Maximum in-flight per-chunk summarization calls.
    pub summarize_concurrency: usize,
    /// Maximum candidates scored per recommendation request.
    pub candidate_cap: usize,
    /// Recommendations returned per request.
    pub top_k: usize,
    /// Working language of the catalog.
    pub catalog_language: String,
    /// Segments kept in a running context before it is re-compressed.
    pub context_max_segments: usize,
    /// Size of the merged segment produced by re-compression.
    pub context_target_words: usize,
    /// Retry policy for collaborator calls.
    pub retry: RetryConfig,
}

/// Retry settings for collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly.
    pub backoff_ms: u64,
    /// Deadline for a single attempt; zero waits forever.
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 200,
            timeout_ms: 60_000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            words_per_page: 500,
            summary_interval: 50,
            compression_divisor: 6,
            chunk_word_ceiling: 500,
            min_chunk_target_words: 16,
            default_target_words: 100,
            fallback_summary_words: 200,
            summarize_concurrency: 4,
            candidate_cap: 40,
            top_k: 5,
            catalog_language: "en".to_string(),
            context_max_segments: 8,
            context_target_words: 400,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file absent, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(Error::Config(format!("{}: {err}", path.display()))),
        }
    }

    /// Reject values that would make paging or ranking meaningless.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("page_size", self.page_size),
            ("words_per_page", self.words_per_page),
            ("summary_interval", self.summary_interval),
            ("compression_divisor", self.compression_divisor),
            ("chunk_word_ceiling", self.chunk_word_ceiling),
            ("min_chunk_target_words", self.min_chunk_target_words),
            ("summarize_concurrency", self.summarize_concurrency),
            ("top_k", self.top_k),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("{name} must be > 0")));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be > 0".into()));
        }
        Ok(())
    }
}
