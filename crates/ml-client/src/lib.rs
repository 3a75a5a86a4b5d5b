//! ML backend clients for the anime recommender.
//!
//! This crate provides the two network collaborators of the pipeline:
//! - An embedding backend that turns text into vectors ([`Embedder`])
//! - A language-model backend that turns a prompt into free text ([`LanguageModel`])
//!
//! Both are traits so the pipeline can be exercised with in-process fakes.
//! The HTTP implementations handle:
//! - Connection management and per-request timeouts
//! - Converting Rust types to the services' JSON payloads
//! - Mapping transport and status failures onto [`BackendError`]

use async_trait::async_trait;
use thiserror::Error;

pub mod chat;
pub mod embedding;
pub mod http;

pub use chat::{ChatCompletionsClient, ChatSettings};
pub use embedding::HuggingFaceEmbedder;

/// Errors that can occur when talking to an ML backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("request to {service} timed out")]
    Timeout { service: String },

    #[error("failed to reach {service}: {reason}")]
    Connection { service: String, reason: String },

    #[error("rate limited by backend (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response from backend: {0}")]
    MalformedResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    /// Whether retrying the same request could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout { .. }
            | BackendError::Connection { .. }
            | BackendError::RateLimited { .. } => true,
            BackendError::Status { status, .. } => *status >= 500,
            BackendError::MalformedResponse(_) | BackendError::InvalidRequest(_) => false,
        }
    }
}

/// Converts text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Name of the embedding model, recorded in the catalog
    fn model_name(&self) -> &str;

    /// Embed a batch of texts; returns one vector per input, in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError>;

    /// Embed a single query string
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| BackendError::MalformedResponse("no embedding returned".into()))
    }
}

/// Produces free text from a prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_query_uses_batch_call() {
        let vector = FixedEmbedder.embed_query("abc").await.unwrap();
        assert_eq!(vector, vec![3.0, 1.0]);
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Timeout { service: "llm".into() }.is_transient());
        assert!(BackendError::RateLimited { retry_after_secs: Some(2) }.is_transient());
        assert!(BackendError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!BackendError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!BackendError::MalformedResponse("x".into()).is_transient());
    }
}
