//! Error types for query normalization and synthesis.

use ml_client::BackendError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,

    #[error("query is {found} characters long, the limit is {max}")]
    TooLong { max: usize, found: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),

    #[error("failed to read prompt template {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    /// Timeout, rate limit, bad status or malformed output from the model
    #[error("language model backend failed: {0}")]
    Backend(#[source] BackendError),

    /// No retrieved records to ground the prompt in
    #[error("no retrieved records to build a prompt from")]
    EmptyContext,
}

impl SynthesisError {
    pub fn is_transient(&self) -> bool {
        match self {
            SynthesisError::Backend(err) => err.is_transient(),
            SynthesisError::EmptyContext => false,
        }
    }
}
