//! Loading and saving the persisted vector catalog.
//!
//! The on-disk format is a single JSON document:
//!
//! ```json
//! {
//!   "model": "sentence-transformers/all-MiniLM-L6-v2",
//!   "dimension": 384,
//!   "records": [
//!     { "id": 1, "title": "...", "synopsis": "...", "genres": ["..."], "embedding": [0.1, ...] }
//!   ]
//! }
//! ```
//!
//! Loading always rebuilds the catalog through `AnimeCatalog::insert`, so a file
//! that was edited by hand gets the same validation as freshly embedded data.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{DataLoadError, Result};
use crate::types::*;

/// Raw file layout, before validation
#[derive(Debug, Deserialize)]
struct CatalogFile {
    model: String,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    records: Vec<AnimeRecord>,
}

impl AnimeCatalog {
    /// Load a catalog from a JSON file written by `save_to_file`.
    ///
    /// Steps:
    /// 1. Open and deserialize the file
    /// 2. Re-insert every record (duplicate ids, bad vectors, mixed dimensions fail)
    /// 3. Check the header dimension against the records
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading anime catalog from {:?}", path);

        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DataLoadError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => DataLoadError::IoError(e),
        })?;

        let raw: CatalogFile = serde_json::from_reader(BufReader::new(file))?;
        let catalog = Self::from_parts(raw.model, raw.dimension, raw.records)?;

        info!(
            "Loaded {} anime records (model: {}, dimension: {:?})",
            catalog.len(),
            catalog.model(),
            catalog.dimension()
        );
        Ok(catalog)
    }

    /// Write the catalog as pretty-printed JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;

        debug!("Wrote {} records to {:?}", self.len(), path);
        Ok(())
    }

    fn from_parts(
        model: String,
        dimension: Option<usize>,
        records: Vec<AnimeRecord>,
    ) -> Result<Self> {
        let mut catalog = AnimeCatalog::new(model);
        for record in records {
            catalog.insert(record)?;
        }

        match (dimension, catalog.dimension()) {
            (Some(declared), Some(actual)) if declared != actual => {
                Err(DataLoadError::ValidationError(format!(
                    "catalog declares dimension {declared} but records have {actual}"
                )))
            }
            (Some(declared), None) => {
                catalog.dimension = Some(declared);
                Ok(catalog)
            }
            _ => Ok(catalog),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_catalog() -> AnimeCatalog {
        let mut catalog = AnimeCatalog::new("test-model");
        catalog
            .insert(AnimeRecord::new(
                AnimeDocument::new(5, "Toradora!")
                    .with_synopsis("Two students agree to help each other's love lives.")
                    .with_genres(["Comedy", "Romance"]),
                vec![0.1, 0.2, 0.3],
            ))
            .unwrap();
        catalog
            .insert(AnimeRecord::new(
                AnimeDocument::new(2, "Mushishi"),
                vec![0.3, 0.2, 0.1],
            ))
            .unwrap();
        catalog
    }

    #[test]
    fn test_save_and_load_preserves_order_and_content() {
        let catalog = sample_catalog();
        let file = NamedTempFile::new().unwrap();

        catalog.save_to_file(file.path()).unwrap();
        let loaded = AnimeCatalog::load_from_file(file.path()).unwrap();

        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.dimension(), Some(3));
        assert_eq!(loaded.records(), catalog.records());
        assert_eq!(loaded.get(5).unwrap().document.genres, vec!["Comedy", "Romance"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AnimeCatalog::load_from_file(Path::new("/nonexistent/anime-index.json"))
            .unwrap_err();
        assert!(matches!(err, DataLoadError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_rejects_declared_dimension_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model":"m","dimension":4,"records":[{{"id":1,"title":"A","embedding":[1.0,0.0]}}]}}"#
        )
        .unwrap();

        let err = AnimeCatalog::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, DataLoadError::ValidationError(_)));
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model":"m","records":[
                {{"id":1,"title":"A","embedding":[1.0]}},
                {{"id":1,"title":"B","embedding":[0.5]}}
            ]}}"#
        )
        .unwrap();

        let err = AnimeCatalog::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateId { id: 1 }));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = AnimeCatalog::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, DataLoadError::Json(_)));
    }
}
