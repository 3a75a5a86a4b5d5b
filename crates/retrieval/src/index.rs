//! The vector index seam.
//!
//! A `VectorIndex` answers nearest-neighbour queries over the anime catalog.
//! It is read-only from the pipeline's point of view.

use async_trait::async_trait;

use crate::error::IndexError;
use crate::types::ScoredRecord;

/// Nearest-neighbour search over embedded anime records.
///
/// ## Contract
/// - Returns at most `k` hits
/// - Hits are ordered by descending similarity, ties in insertion order
/// - Never mutates the index
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns the name of this index backend (for logging/debugging)
    fn name(&self) -> &str;

    /// Number of records, when the backend can tell cheaply
    fn len_hint(&self) -> Option<usize> {
        None
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>, IndexError>;
}
