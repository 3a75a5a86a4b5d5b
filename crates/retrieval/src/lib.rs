//! # Retrieval Crate
//!
//! This crate finds the anime most similar to a free-text query.
//!
//! ## Components
//!
//! ### Vector indexes
//! Two implementations of the `VectorIndex` seam:
//! - `InMemoryIndex`: exhaustive cosine scan over a loaded catalog, parallel with Rayon
//! - `ChromaIndex`: a collection on a Chroma server, queried over HTTP
//!
//! ### Retriever
//! Embeds the query, searches the index and returns a `RetrievalResult`
//! ordered by descending similarity (ties keep insertion order).
//!
//! ### Ingestion
//! `build_catalog` embeds parsed documents in batches to produce the
//! persisted catalog the in-memory index loads.
//!
//! ## Example Usage
//!
//! ```ignore
//! use retrieval::{InMemoryIndex, Retriever};
//! use ml_client::HuggingFaceEmbedder;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let index = InMemoryIndex::load(Path::new("data/anime_index.json"))?;
//! let retriever = Retriever::new(Arc::new(embedder), Arc::new(index));
//!
//! let result = retriever.retrieve("mecha with emotional depth", 5).await?;
//! for hit in &result {
//!     println!("{:.3} {}", hit.score, hit.document.title);
//! }
//! ```
//!
//! ## Performance Targets
//!
//! - In-memory search: <5ms for 20k records at 384 dimensions

// Public modules
pub mod chroma;
pub mod error;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod retriever;
pub mod similarity;
pub mod types;

// Re-export commonly used types
pub use chroma::ChromaIndex;
pub use error::{IndexError, RetrievalError};
pub use index::VectorIndex;
pub use ingest::{build_catalog, IngestError, DEFAULT_BATCH_SIZE};
pub use memory::InMemoryIndex;
pub use retriever::Retriever;
pub use types::{RetrievalResult, ScoredRecord};
