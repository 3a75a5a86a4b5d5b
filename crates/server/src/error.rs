//! Errors surfaced by the orchestrator.

use data_loader::DataLoadError;
use ml_client::BackendError;
use pipeline::{QueryError, SynthesisError, TemplateError};
use retrieval::{IndexError, RetrievalError};
use thiserror::Error;

use crate::config::ConfigError;

/// Coarse classification callers can branch on (reprompt, show an outage
/// notice, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyQuery,
    QueryTooLong,
    EmbeddingFailure,
    IndexUnavailable,
    IndexRejected,
    DimensionMismatch,
    SynthesisBackend,
}

/// The stage error that ended a request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureCause {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// A recommendation request that could not be completed.
///
/// Carries the original stage error (also reachable through `source()`)
/// and how many attempts the failing stage made.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("recommendation failed after {attempts} attempt(s): {cause}")]
pub struct RecommendationError {
    #[source]
    cause: FailureCause,
    attempts: u32,
}

impl RecommendationError {
    pub fn new(cause: impl Into<FailureCause>, attempts: u32) -> Self {
        Self {
            cause: cause.into(),
            attempts,
        }
    }

    pub fn cause(&self) -> &FailureCause {
        &self.cause
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.cause {
            FailureCause::Query(QueryError::Empty) => ErrorKind::EmptyQuery,
            FailureCause::Query(QueryError::TooLong { .. }) => ErrorKind::QueryTooLong,
            FailureCause::Retrieval(RetrievalError::EmbeddingFailure(_)) => {
                ErrorKind::EmbeddingFailure
            }
            FailureCause::Retrieval(RetrievalError::IndexUnavailable(_)) => {
                ErrorKind::IndexUnavailable
            }
            FailureCause::Retrieval(RetrievalError::IndexRejected(_)) => ErrorKind::IndexRejected,
            FailureCause::Retrieval(RetrievalError::DimensionMismatch { .. }) => {
                ErrorKind::DimensionMismatch
            }
            FailureCause::Synthesis(_) => ErrorKind::SynthesisBackend,
        }
    }

    pub fn is_transient(&self) -> bool {
        match &self.cause {
            FailureCause::Query(_) => false,
            FailureCause::Retrieval(err) => err.is_transient(),
            FailureCause::Synthesis(err) => err.is_transient(),
        }
    }
}

/// Failures while building the pipeline from configuration
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load vector index: {0}")]
    Catalog(#[from] DataLoadError),

    #[error("failed to connect to vector index: {0}")]
    Index(#[from] IndexError),

    #[error("failed to set up backend client: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}
