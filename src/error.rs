//! Error types for precis.

use crate::services::ServiceError;

/// Errors surfaced by the compression and recommendation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A book, user record, or page does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Book bytes could not be decoded as text in any supported encoding.
    #[error("cannot decode '{book}': no supported encoding fits")]
    Decode {
        /// The book whose bytes failed to decode.
        book: String,
    },

    /// An external collaborator failed after retries.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Summarization could not produce a result.
    #[error("compression failed: {0}")]
    Compression(String),

    /// Input or stored data does not match the expected shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// The record store could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// Engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for precis operations.
pub type Result<T> = std::result::Result<T, Error>;
