//! Error types for the data-loader crate.
//!
//! Covers both halves of the crate's job: reading the raw anime CSV and
//! loading/validating the persisted vector catalog.

use thiserror::Error;

use crate::types::AnimeId;

/// Errors that can occur while parsing anime data or loading a catalog.
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// File could not be found or opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading or writing a file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The CSV reader rejected the input (bad quoting, invalid UTF-8, ...)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The catalog file is not valid JSON for the expected schema
    #[error("Catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A row in a data file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// A required column is absent from the CSV header
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    /// Two records share the same identifier
    #[error("Duplicate anime id {id}")]
    DuplicateId { id: AnimeId },

    /// An embedding does not match the catalog's fixed dimension
    #[error("Embedding for anime {id} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        id: AnimeId,
        expected: usize,
        found: usize,
    },

    /// Data validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
