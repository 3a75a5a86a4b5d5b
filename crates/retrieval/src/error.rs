//! Error types for retrieval.

use ml_client::BackendError;
use thiserror::Error;

/// Failures raised by a `VectorIndex` implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    /// The index answered but refused the request (unknown collection, bad query)
    #[error("vector index rejected the request: {0}")]
    Rejected(String),

    #[error("query vector has dimension {found}, index expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Failures of `Retriever::retrieve`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    /// The query could not be embedded (timeout, backend down, bad payload)
    #[error("failed to embed query: {0}")]
    EmbeddingFailure(#[source] BackendError),

    /// The vector index could not be reached or did not answer in time
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The vector index refused the request; retrying will not help
    #[error("vector index rejected the request: {0}")]
    IndexRejected(String),

    /// The embedding model and the index disagree on vector size
    #[error("query vector has dimension {found}, index expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl RetrievalError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Embedding failures are only transient when the backend error is
    /// (an invalid API key will not fix itself). Index outages always are,
    /// index rejections never.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::EmbeddingFailure(err) => err.is_transient(),
            RetrievalError::IndexUnavailable(_) => true,
            RetrievalError::IndexRejected(_) | RetrievalError::DimensionMismatch { .. } => false,
        }
    }
}

impl From<IndexError> for RetrievalError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Unavailable(reason) => RetrievalError::IndexUnavailable(reason),
            IndexError::Rejected(reason) => RetrievalError::IndexRejected(reason),
            IndexError::DimensionMismatch { expected, found } => {
                RetrievalError::DimensionMismatch { expected, found }
            }
        }
    }
}
