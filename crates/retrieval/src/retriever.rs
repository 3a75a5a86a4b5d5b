//! Query-to-neighbours retrieval.
//!
//! ## Algorithm
//! 1. Embed the query (bounded by the per-call timeout)
//! 2. Search the vector index for `k` neighbours (same bound)
//! 3. Drop hits below the similarity floor, if one is set
//! 4. Re-establish the ordering invariant on whatever the backend returned:
//!    descending score, stable on ties, at most `k` hits

use std::sync::Arc;
use std::time::{Duration, Instant};

use ml_client::{BackendError, Embedder};
use tracing::{debug, info, instrument};

use crate::error::RetrievalError;
use crate::index::VectorIndex;
use crate::types::RetrievalResult;

/// Embeds queries and finds their nearest anime records.
///
/// Cheap to clone; both backends are shared handles.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    call_timeout: Duration,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            call_timeout: Duration::from_secs(30),
            min_score: None,
        }
    }

    /// Configure the per-backend-call timeout (default: 30s)
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    /// Treat hits scoring below `min_score` as not found
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Retrieve up to `k` records for `query`, most similar first
    #[instrument(skip(self, query), fields(index = self.index.name()))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RetrievalError> {
        if k == 0 {
            return Ok(RetrievalResult::empty());
        }
        let start = Instant::now();

        let vector = tokio::time::timeout(self.call_timeout, self.embedder.embed_query(query))
            .await
            .map_err(|_| {
                RetrievalError::EmbeddingFailure(BackendError::Timeout {
                    service: "embedding backend".to_string(),
                })
            })?
            .map_err(RetrievalError::EmbeddingFailure)?;
        debug!("Embedded query into {} dimensions", vector.len());

        let mut hits = tokio::time::timeout(self.call_timeout, self.index.search(&vector, k))
            .await
            .map_err(|_| {
                RetrievalError::IndexUnavailable(format!(
                    "{} search timed out after {:?}",
                    self.index.name(),
                    self.call_timeout
                ))
            })??;

        if let Some(min_score) = self.min_score {
            let before = hits.len();
            hits.retain(|h| h.score >= min_score);
            if hits.len() < before {
                debug!("Dropped {} hits below {}", before - hits.len(), min_score);
            }
        }

        let result = RetrievalResult::from_hits(hits, k);
        info!(
            "Retrieved {} records in {:.2?}",
            result.len(),
            start.elapsed()
        );
        Ok(result)
    }
}
