//! Error taxonomy shared by every engine crate.
//!
//! Write paths fail loudly with [`IngestionError`]; read paths downgrade
//! backend trouble to empty results and only surface [`Error::Validation`].

use thiserror::Error;

/// Failures reported by a vector backend, split by recovery strategy.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The collection already exists (lost a creation race).
    #[error("collection already exists: {0}")]
    Conflict(String),

    /// The collection does not exist.
    #[error("collection not found: {0}")]
    NotFound(String),

    #[error("vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Transport or storage failure; the caller owns retry policy.
    #[error("vector backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by an embedding provider.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    /// Provider cannot be reached or was never loaded. Triggers the
    /// deterministic fallback embedding.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered but the answer is unusable.
    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Fatal to the whole batch; nothing reaches the lexical index.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("embedding failure: {0}")]
    Embedding(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<BackendError> for IngestionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DimensionMismatch { expected, actual } => {
                IngestionError::DimensionMismatch { expected, actual }
            }
            other => IngestionError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<EmbedError> for IngestionError {
    fn from(err: EmbedError) -> Self {
        IngestionError::Embedding(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rejected before any I/O.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Corpus is present but unusable; read paths treat this as "no hits".
    #[error("Lexical index degraded: {0}")]
    IndexDegraded(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
