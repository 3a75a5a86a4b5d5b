//! Query normalization and response synthesis.
//!
//! This crate provides:
//! - `normalize` / `normalize_bounded` for validating free-text queries
//! - `PromptTemplate` / `PromptBuilder` for deterministic, bounded prompts
//! - `Synthesizer` for turning retrieval results into a recommendation
//!
//! ## Architecture
//! The orchestrator drives a request through these stages:
//! 1. `normalize` rejects blank input before any backend is touched
//! 2. The retriever (in the `retrieval` crate) finds the nearest anime
//! 3. `Synthesizer::synthesize` prompts the language model, or falls back
//!    to a fixed message when nothing was retrieved
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{normalize, PromptBuilder, PromptTemplate, Synthesizer};
//!
//! let query = normalize("  soft romance with beautiful animation ")?;
//! let synthesizer = Synthesizer::new(model, PromptBuilder::new(PromptTemplate::default()));
//! let synthesis = synthesizer.synthesize(&query, &results).await?;
//! println!("{}", synthesis.text);
//! ```

pub mod error;
pub mod prompt;
pub mod query;
pub mod synthesizer;

// Re-export main types
pub use error::{QueryError, SynthesisError, TemplateError};
pub use prompt::{PromptBuilder, PromptTemplate};
pub use query::{normalize, normalize_bounded, DEFAULT_MAX_QUERY_CHARS};
pub use synthesizer::{Synthesis, Synthesizer, DEFAULT_FALLBACK_MESSAGE};
