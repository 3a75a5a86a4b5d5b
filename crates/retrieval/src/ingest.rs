//! Offline catalog construction.
//!
//! Parsed documents are embedded in batches through the configured
//! `Embedder` and collected into an `AnimeCatalog`, which is then saved as
//! the JSON file `InMemoryIndex::load` reads.

use std::time::Instant;

use data_loader::{AnimeCatalog, AnimeDocument, AnimeRecord, DataLoadError};
use ml_client::{BackendError, Embedder};
use thiserror::Error;
use tracing::{info, instrument};

pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("embedding batch starting at document {offset} failed: {source}")]
    Embedding {
        offset: usize,
        #[source]
        source: BackendError,
    },

    #[error("embedder returned {found} vectors for a batch of {expected}")]
    BatchSize { expected: usize, found: usize },

    #[error(transparent)]
    Catalog(#[from] DataLoadError),
}

/// Embed `documents` and collect them into a catalog for `embedder`'s model.
///
/// Documents keep their input order, which becomes the index's insertion
/// order (and therefore its tie-break order). A `batch_size` of 0 is
/// treated as 1.
#[instrument(skip(embedder, documents), fields(model = embedder.model_name(), documents = documents.len()))]
pub async fn build_catalog(
    embedder: &dyn Embedder,
    documents: Vec<AnimeDocument>,
    batch_size: usize,
) -> Result<AnimeCatalog, IngestError> {
    let start = Instant::now();
    let batch_size = batch_size.max(1);
    let mut catalog = AnimeCatalog::new(embedder.model_name());

    let mut offset = 0;
    let mut pending = documents.into_iter().peekable();
    while pending.peek().is_some() {
        let batch: Vec<AnimeDocument> = pending.by_ref().take(batch_size).collect();
        let texts: Vec<String> = batch.iter().map(AnimeDocument::combined_text).collect();

        let vectors = embedder
            .embed(&texts)
            .await
            .map_err(|source| IngestError::Embedding { offset, source })?;
        if vectors.len() != batch.len() {
            return Err(IngestError::BatchSize {
                expected: batch.len(),
                found: vectors.len(),
            });
        }

        for (document, embedding) in batch.into_iter().zip(vectors) {
            catalog.insert(AnimeRecord::new(document, embedding))?;
        }
        offset += texts.len();
        info!("Embedded {} documents", offset);
    }

    info!(
        "Built catalog of {} records ({:?} dimensions) in {:.2?}",
        catalog.len(),
        catalog.dimension(),
        start.elapsed()
    );
    Ok(catalog)
}
