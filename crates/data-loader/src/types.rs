//! Core domain types for the anime catalog.
//!
//! This module defines the fundamental data structures used throughout the system:
//! - `AnimeDocument`: the text half of an anime entry (what gets shown to the model)
//! - `AnimeRecord`: a document plus its precomputed embedding
//! - `AnimeCatalog`: the ordered, immutable-once-inserted vector index

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DataLoadError, Result};

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for an anime (MyAnimeList id when the source has one)
pub type AnimeId = u64;

/// Dense embedding vector
pub type Embedding = Vec<f32>;

// =============================================================================
// Documents and Records
// =============================================================================

/// Descriptive text for one anime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeDocument {
    pub id: AnimeId,
    pub title: String,
    /// Plot summary, may be empty when the source has none
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl AnimeDocument {
    pub fn new(id: AnimeId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            synopsis: String::new(),
            genres: Vec::new(),
        }
    }

    pub fn with_synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = synopsis.into();
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    /// The text that is embedded for this document at index time.
    ///
    /// Format: `Title: {title} Overview: {synopsis} Genres: {g1, g2}`
    pub fn combined_text(&self) -> String {
        format!(
            "Title: {} Overview: {} Genres: {}",
            self.title,
            self.synopsis,
            self.genres.join(", ")
        )
    }
}

/// An anime document together with its embedding.
///
/// Records are immutable once they are inserted into an `AnimeCatalog`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeRecord {
    #[serde(flatten)]
    pub document: AnimeDocument,
    pub embedding: Embedding,
}

impl AnimeRecord {
    pub fn new(document: AnimeDocument, embedding: Embedding) -> Self {
        Self {
            document,
            embedding,
        }
    }

    pub fn id(&self) -> AnimeId {
        self.document.id
    }

    pub fn title(&self) -> &str {
        &self.document.title
    }
}

// =============================================================================
// AnimeCatalog - the persisted vector index
// =============================================================================

/// Ordered collection of embedded anime records.
///
/// Insertion order is preserved; retrieval uses it to break score ties.
/// Every embedding in a catalog has the same dimension, fixed by the first
/// inserted record (or by the file header when loaded from disk).
#[derive(Debug, Clone, Serialize)]
pub struct AnimeCatalog {
    /// Name of the embedding model that produced the vectors
    pub(crate) model: String,
    pub(crate) dimension: Option<usize>,
    pub(crate) records: Vec<AnimeRecord>,

    #[serde(skip)]
    pub(crate) positions: HashMap<AnimeId, usize>,
}

impl AnimeCatalog {
    /// Creates an empty catalog for vectors produced by `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dimension: None,
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embedding dimension, `None` while the catalog is empty
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// All records in insertion order
    pub fn records(&self) -> &[AnimeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get a record by id
    pub fn get(&self, id: AnimeId) -> Option<&AnimeRecord> {
        self.positions.get(&id).map(|&pos| &self.records[pos])
    }

    /// Insert a record at the end of the catalog.
    ///
    /// Fails on duplicate ids, empty or non-finite vectors, and vectors whose
    /// dimension differs from the catalog's.
    pub fn insert(&mut self, record: AnimeRecord) -> Result<()> {
        let id = record.id();
        if self.positions.contains_key(&id) {
            return Err(DataLoadError::DuplicateId { id });
        }
        check_embedding(&record)?;

        let found = record.embedding.len();
        match self.dimension {
            Some(expected) if expected != found => {
                return Err(DataLoadError::DimensionMismatch {
                    id,
                    expected,
                    found,
                });
            }
            Some(_) => {}
            None => self.dimension = Some(found),
        }

        self.positions.insert(id, self.records.len());
        self.records.push(record);
        Ok(())
    }
}

fn check_embedding(record: &AnimeRecord) -> Result<()> {
    if record.embedding.is_empty() {
        return Err(DataLoadError::ValidationError(format!(
            "anime {} has an empty embedding",
            record.id()
        )));
    }
    if record.embedding.iter().any(|v| !v.is_finite()) {
        return Err(DataLoadError::ValidationError(format!(
            "anime {} has a non-finite embedding component",
            record.id()
        )));
    }
    Ok(())
}
