/// Chunk vector indexes: reconstructible HNSW and exact flat inner product
use super::l2_normalize;
use hnsw_rs::prelude::*;
use ndarray::{Array2, ArrayView1, Axis};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Position {position} out of range for index of {len} vectors")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with index position and similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Position of the vector in the index it was searched in
    pub position: usize,
    /// Cosine similarity score (higher is more similar)
    pub score: f32,
}

/// HNSW construction and search parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Number of connections per layer
    pub m: usize,
    /// Construction beam width (higher = better recall, slower build)
    pub ef_construction: usize,
    /// Search beam width (higher = better recall, slower search)
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

const HNSW_MAX_LAYER: usize = 16;

/// Approximate nearest neighbour index over chunk embeddings
///
/// Keeps the raw (unit-length) vectors next to the HNSW graph so any
/// position can be reconstructed exactly. Position `i` is the `i`-th vector
/// the index was built from, which is also the `i`-th chunk metadata record.
pub struct ChunkIndex {
    vectors: Array2<f32>,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    ef_search: usize,
}

impl ChunkIndex {
    /// Build an index from one vector per row
    pub fn build(mut vectors: Array2<f32>, params: HnswParams) -> Result<Self, VectorIndexError> {
        if vectors.nrows() > 0 && vectors.ncols() == 0 {
            return Err(VectorIndexError::InitializationError(
                "Vectors must have at least one dimension".to_string(),
            ));
        }

        for mut row in vectors.axis_iter_mut(Axis(0)) {
            let slice = row.as_slice_mut().ok_or_else(|| {
                VectorIndexError::InitializationError("Vectors must be contiguous".to_string())
            })?;
            l2_normalize(slice);
        }

        let hnsw = if vectors.nrows() == 0 {
            None
        } else {
            let hnsw = Hnsw::<f32, DistCosine>::new(
                params.m,
                vectors.nrows(),
                HNSW_MAX_LAYER,
                params.ef_construction,
                DistCosine,
            );
            for (position, row) in vectors.axis_iter(Axis(0)).enumerate() {
                let data = row.to_vec();
                hnsw.insert((data.as_slice(), position));
            }
            Some(hnsw)
        };

        tracing::debug!(
            "Built chunk index with {} vectors of dimension {}",
            vectors.nrows(),
            vectors.ncols()
        );

        Ok(Self {
            vectors,
            hnsw,
            ef_search: params.ef_search.max(1),
        })
    }

    /// Approximate k nearest neighbours, sorted by score descending
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query.len())?;

        let Some(hnsw) = &self.hnsw else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<SearchResult> = hnsw
            .search(query, k, self.ef_search.max(k))
            .into_iter()
            .filter(|neighbour| neighbour.distance.is_finite())
            .map(|neighbour| SearchResult {
                position: neighbour.d_id,
                score: 1.0 - neighbour.distance, // Convert distance to similarity
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        Ok(results)
    }

    /// Exact copy of the vector stored at `position`
    pub fn reconstruct(&self, position: usize) -> Result<Vec<f32>, VectorIndexError> {
        if position >= self.len() {
            return Err(VectorIndexError::PositionOutOfRange {
                position,
                len: self.len(),
            });
        }
        Ok(self.vectors.row(position).to_vec())
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    fn check_dimension(&self, actual: usize) -> Result<(), VectorIndexError> {
        if !self.is_empty() && actual != self.dimension() {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension(),
                actual,
            });
        }
        Ok(())
    }
}

/// Exact inner-product index
///
/// Brute force over a small set of vectors. Built per query from a subset of
/// a [`ChunkIndex`] and dropped when the query completes.
pub struct FlatIpIndex {
    dimension: usize,
    vectors: Vec<f32>,
    len: usize,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            len: 0,
        }
    }

    /// Append a vector; its local position is the current length
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.vectors.extend_from_slice(vector);
        self.len += 1;
        Ok(self.len - 1)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exact top-k by inner product, ties broken by local position
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let matrix = ArrayView1::from(self.vectors.as_slice())
            .into_shape_with_order((self.len, self.dimension))
            .map_err(|e| VectorIndexError::InitializationError(e.to_string()))?;
        let scores = matrix.dot(&ArrayView1::from(query));

        let scored: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        let top = crate::retrieval::select_top(scored, k);

        Ok(top
            .into_iter()
            .map(|(position, score)| SearchResult { position, score })
            .collect())
    }
}
