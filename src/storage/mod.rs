//! Storage layer for ragline
//!
//! Document text lives in a SQLite database (one table per dataset); the
//! precomputed sparse, dense and ANN representations live as artifact files
//! next to it.

pub mod artifacts;
pub mod database;

use crate::dataset::Dataset;
use crate::error::Result;
use std::collections::HashMap;

pub use artifacts::{ArtifactLayout, ArtifactLoader, MatrixArtifact, VectorArtifact};
pub use database::{DbPool, SqliteDocumentStore};

/// Table and column names holding one dataset's documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table: String,
    pub id_column: String,
    pub text_column: String,
}

impl TableSpec {
    /// Default table layout of a dataset
    pub fn for_dataset(dataset: Dataset) -> Self {
        Self {
            table: dataset.default_table(),
            id_column: dataset.default_id_column().to_string(),
            text_column: "text".to_string(),
        }
    }
}

/// Read access to document bodies
pub trait DocumentStore: Send + Sync {
    /// Texts for the given ids. Ids with no document are absent from the map.
    fn get_documents_batch(
        &self,
        dataset: Dataset,
        doc_ids: &[String],
    ) -> Result<HashMap<String, String>>;

    /// Text of a single document
    fn get_document(&self, dataset: Dataset, doc_id: &str) -> Result<Option<String>> {
        let mut found = self.get_documents_batch(dataset, &[doc_id.to_string()])?;
        Ok(found.remove(doc_id))
    }

    /// Every document id in canonical (storage) order
    ///
    /// This order defines the row order of the sparse matrix.
    fn load_doc_ids(&self, dataset: Dataset) -> Result<Vec<String>>;
}

/// Fingerprint of a doc id sequence: hex blake3 of the ids joined by `\n`
pub fn doc_ids_fingerprint(doc_ids: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (i, doc_id) in doc_ids.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(doc_id.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_spec_defaults() {
        let spec = TableSpec::for_dataset(Dataset::Webis);
        assert_eq!(spec.table, "cleaned_webis");
        assert_eq!(spec.id_column, "_id");
        assert_eq!(spec.text_column, "text");
    }

    #[test]
    fn test_fingerprint_matches_joined_ids() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let expected = blake3::hash(b"a\nb\nc").to_hex().to_string();
        assert_eq!(doc_ids_fingerprint(&ids), expected);
    }

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        let forward = vec!["1".to_string(), "2".to_string()];
        let reverse = vec!["2".to_string(), "1".to_string()];
        assert_ne!(doc_ids_fingerprint(&forward), doc_ids_fingerprint(&reverse));
    }
}
