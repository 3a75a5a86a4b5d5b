//! # Data Loader Crate
//!
//! This crate handles the anime catalog: reading the raw CSV dump and
//! persisting/loading the embedded vector index.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (AnimeDocument, AnimeRecord, AnimeCatalog)
//! - **parser**: Parse the anime CSV into documents
//! - **index**: Load and save the JSON catalog
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::AnimeCatalog;
//! use std::path::Path;
//!
//! let catalog = AnimeCatalog::load_from_file(Path::new("data/anime_index.json"))?;
//! println!("{} records, dimension {:?}", catalog.len(), catalog.dimension());
//! ```

// Public modules
pub mod error;
pub mod types;
pub mod parser;
pub mod index;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use parser::{parse_anime_csv, parse_anime_reader};
pub use types::{AnimeCatalog, AnimeDocument, AnimeId, AnimeRecord, Embedding};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_creation() {
        let catalog = AnimeCatalog::new("all-MiniLM-L6-v2");

        assert!(catalog.is_empty());
        assert_eq!(catalog.model(), "all-MiniLM-L6-v2");
        assert!(catalog.get(1).is_none());
    }

    #[test]
    fn test_csv_to_catalog() {
        let csv = "MAL_ID,Name,Genres\n1,Cowboy Bebop,\"Action, Sci-Fi\"\n2,Nana,\"Drama, Romance\"\n";
        let docs = parse_anime_reader(csv.as_bytes(), "inline.csv").unwrap();

        let mut catalog = AnimeCatalog::new("test-model");
        for (i, doc) in docs.into_iter().enumerate() {
            catalog
                .insert(AnimeRecord::new(doc, vec![i as f32, 1.0]))
                .unwrap();
        }

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(2).unwrap().title(), "Nana");
    }
}
