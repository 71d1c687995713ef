/// TF-IDF vectorizer and compressed sparse row matrix
use ahash::AHashMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SparseError {
    #[error("Malformed CSR matrix: {0}")]
    MalformedMatrix(String),

    #[error("Malformed vectorizer: {0}")]
    MalformedVectorizer(String),
}

/// Sparse vector with sorted, unique column indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<usize>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Expand into a dense vector of `width` columns
    fn to_dense(&self, width: usize) -> Array1<f32> {
        let mut dense = Array1::zeros(width);
        for (&col, &value) in self.indices.iter().zip(self.values.iter()) {
            if col < width {
                dense[col] = value;
            }
        }
        dense
    }
}

/// Normalization applied to transformed query vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermNorm {
    L2,
    None,
}

fn default_norm() -> TermNorm {
    TermNorm::L2
}

/// Fitted TF-IDF vectorizer
///
/// Splits already-normalized text on whitespace, weights raw term counts by
/// the fitted inverse document frequencies and scales the result to unit
/// length, producing vectors compatible with the rows of the corpus matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    #[serde(default)]
    sublinear_tf: bool,
    #[serde(default = "default_norm")]
    norm: TermNorm,
}

impl TfidfVectorizer {
    pub fn new(
        vocabulary: HashMap<String, usize>,
        idf: Vec<f32>,
        sublinear_tf: bool,
        norm: TermNorm,
    ) -> Result<Self, SparseError> {
        let vectorizer = Self {
            vocabulary,
            idf,
            sublinear_tf,
            norm,
        };
        vectorizer.validate()?;
        Ok(vectorizer)
    }

    /// Check that every vocabulary entry points at an idf weight
    pub fn validate(&self) -> Result<(), SparseError> {
        if let Some((term, &col)) = self
            .vocabulary
            .iter()
            .find(|(_, col)| **col >= self.idf.len())
        {
            return Err(SparseError::MalformedVectorizer(format!(
                "term '{}' maps to column {} but only {} idf weights exist",
                term,
                col,
                self.idf.len()
            )));
        }
        Ok(())
    }

    /// Number of feature columns
    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    /// Transform normalized text into a row-compatible sparse vector
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: AHashMap<usize, u32> = AHashMap::new();
        for token in text.split_whitespace() {
            if let Some(&col) = self.vocabulary.get(token) {
                *counts.entry(col).or_insert(0) += 1;
            }
        }

        let mut entries: Vec<(usize, f32)> = counts
            .into_iter()
            .map(|(col, count)| {
                let tf = if self.sublinear_tf {
                    1.0 + (count as f32).ln()
                } else {
                    count as f32
                };
                (col, tf * self.idf[col])
            })
            .collect();
        entries.sort_unstable_by_key(|(col, _)| *col);

        let mut values: Vec<f32> = entries.iter().map(|(_, v)| *v).collect();
        if self.norm == TermNorm::L2 {
            super::l2_normalize(&mut values);
        }

        SparseVector {
            indices: entries.into_iter().map(|(col, _)| col).collect(),
            values,
        }
    }
}

/// Compressed sparse row matrix, one row per document
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    indices: Vec<usize>,
    indptr: Vec<usize>,
}

impl CsrMatrix {
    /// Build a matrix from raw CSR buffers, validating their structure
    pub fn new(
        shape: (usize, usize),
        data: Vec<f32>,
        indices: Vec<usize>,
        indptr: Vec<usize>,
    ) -> Result<Self, SparseError> {
        let (rows, cols) = shape;

        if indptr.len() != rows + 1 {
            return Err(SparseError::MalformedMatrix(format!(
                "indptr has {} entries, expected {}",
                indptr.len(),
                rows + 1
            )));
        }
        if data.len() != indices.len() {
            return Err(SparseError::MalformedMatrix(format!(
                "data has {} entries but indices has {}",
                data.len(),
                indices.len()
            )));
        }
        if indptr.first() != Some(&0) || indptr.last() != Some(&data.len()) {
            return Err(SparseError::MalformedMatrix(
                "indptr must start at 0 and end at nnz".to_string(),
            ));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(SparseError::MalformedMatrix(
                "indptr must be non-decreasing".to_string(),
            ));
        }
        if let Some(&col) = indices.iter().find(|&&col| col >= cols) {
            return Err(SparseError::MalformedMatrix(format!(
                "column index {} out of range for {} columns",
                col, cols
            )));
        }

        Ok(Self {
            rows,
            cols,
            data,
            indices,
            indptr,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Column indices and values of one row
    pub fn row(&self, row: usize) -> (&[usize], &[f32]) {
        let (start, end) = (self.indptr[row], self.indptr[row + 1]);
        (&self.indices[start..end], &self.data[start..end])
    }

    /// Scale every non-empty row to unit length
    pub fn normalize_rows(&mut self) {
        for row in 0..self.rows {
            let (start, end) = (self.indptr[row], self.indptr[row + 1]);
            super::l2_normalize(&mut self.data[start..end]);
        }
    }

    /// Dot product of the query with every row, in row order
    ///
    /// With unit-length rows and query this is the cosine similarity.
    pub fn dot_all(&self, query: &SparseVector) -> Vec<f32> {
        if query.is_empty() {
            return vec![0.0; self.rows];
        }

        let dense_query = query.to_dense(self.cols);
        (0..self.rows)
            .map(|row| {
                let (cols, values) = self.row(row);
                cols.iter()
                    .zip(values.iter())
                    .map(|(&col, &value)| value * dense_query[col])
                    .sum()
            })
            .collect()
    }
}
