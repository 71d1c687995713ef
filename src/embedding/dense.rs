/// Per-document dense embedding table
use super::l2_normalize;
use ahash::AHashMap;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Dense document embeddings with their positional doc id list
///
/// Row `i` of the matrix belongs to `doc_ids[i]`. The positional pairing is
/// turned into an explicit `doc_id -> row` map when the table is built; all
/// alignment goes through that map.
#[derive(Debug, Clone)]
pub struct DenseTable {
    embeddings: Array2<f32>,
    doc_ids: Vec<String>,
    positions: AHashMap<String, usize>,
}

impl DenseTable {
    /// Build a table, normalizing every row to unit length
    ///
    /// Returns `None` when the id list and matrix disagree on row count.
    pub fn new(mut embeddings: Array2<f32>, doc_ids: Vec<String>) -> Option<Self> {
        if embeddings.nrows() != doc_ids.len() {
            return None;
        }

        for mut row in embeddings.axis_iter_mut(Axis(0)) {
            if let Some(slice) = row.as_slice_mut() {
                l2_normalize(slice);
            } else {
                let norm = row.dot(&row).sqrt();
                if norm > f32::EPSILON {
                    row.mapv_inplace(|x| x / norm);
                }
            }
        }

        let mut positions = AHashMap::with_capacity(doc_ids.len());
        for (row, doc_id) in doc_ids.iter().enumerate() {
            // First occurrence wins when an id repeats
            positions.entry(doc_id.clone()).or_insert(row);
        }

        Some(Self {
            embeddings,
            doc_ids,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    /// Row index of a document, if it has an embedding
    pub fn position(&self, doc_id: &str) -> Option<usize> {
        self.positions.get(doc_id).copied()
    }

    /// Cosine similarity of a unit-length query against one row
    pub fn similarity(&self, row: usize, query: &ArrayView1<'_, f32>) -> f32 {
        self.embeddings.row(row).dot(query)
    }

    /// Cosine similarity of a unit-length query against every row
    pub fn similarities(&self, query: &ArrayView1<'_, f32>) -> Array1<f32> {
        self.embeddings.dot(query)
    }
}
