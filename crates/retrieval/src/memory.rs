//! In-memory exhaustive cosine index over a loaded `AnimeCatalog`.
//!
//! ## Algorithm
//! 1. Record norms are computed once at construction
//! 2. A query scores every record in parallel with Rayon
//! 3. Scores are sorted descending, ties by catalog position
//! 4. The first `k` positions are mapped back to documents
//!
//! The scan is CPU-bound, so `search` runs it on Tokio's blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use data_loader::{AnimeCatalog, DataLoadError};
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::similarity::{cosine_with_norms, l2_norm};
use crate::types::ScoredRecord;

/// Brute-force cosine index
#[derive(Clone)]
pub struct InMemoryIndex {
    /// Shared reference to the catalog (read-only, so no Mutex needed)
    catalog: Arc<AnimeCatalog>,
    norms: Arc<Vec<f32>>,
}

impl InMemoryIndex {
    pub fn new(catalog: Arc<AnimeCatalog>) -> Self {
        let norms = catalog
            .records()
            .par_iter()
            .map(|r| l2_norm(&r.embedding))
            .collect();
        Self {
            catalog,
            norms: Arc::new(norms),
        }
    }

    /// Load the catalog file and index it
    pub fn load(path: &Path) -> Result<Self, DataLoadError> {
        let catalog = AnimeCatalog::load_from_file(path)?;
        Ok(Self::new(Arc::new(catalog)))
    }

    pub fn catalog(&self) -> &AnimeCatalog {
        &self.catalog
    }

    /// Score the whole catalog and return the best `k` `(position, score)` pairs
    pub fn rank(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if let Some(expected) = self.catalog.dimension() {
            if expected != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    found: query.len(),
                });
            }
        }
        if k == 0 || self.catalog.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .catalog
            .records()
            .par_iter()
            .zip(self.norms.par_iter())
            .enumerate()
            .map(|(pos, (record, &norm))| {
                (pos, cosine_with_norms(query, query_norm, &record.embedding, norm))
            })
            .collect();

        scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.catalog.len())
    }

    #[instrument(skip(self, query), fields(dimension = query.len()))]
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>, IndexError> {
        let index = self.clone();
        let query = query.to_vec();

        let ranked = tokio::task::spawn_blocking(move || {
            let ranked = index.rank(&query, k)?;
            Ok::<_, IndexError>(
                ranked
                    .into_iter()
                    .map(|(pos, score)| {
                        ScoredRecord::new(index.catalog.records()[pos].document.clone(), score)
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .await
        .map_err(|e| IndexError::Unavailable(format!("search task failed: {e}")))??;

        debug!("In-memory search returned {} hits", ranked.len());
        Ok(ranked)
    }
}
