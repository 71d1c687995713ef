/// Vector representations of documents, chunks and queries
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - TF-IDF vectorizer and CSR matrix for the sparse representation
/// - DenseTable for per-document embeddings
/// - ChunkIndex (HNSW, reconstructible) and FlatIpIndex (exact, ephemeral)
///
/// Storage convention: every stored dense vector and every query vector is
/// L2-normalized, so cosine similarity is a plain dot product.
mod dense;
mod provider;
mod sparse;
mod vector_index;

pub use dense::DenseTable;
pub use provider::{
    EmbeddingError, EmbeddingProvider, FastEmbedProvider, LazyEmbeddingProvider,
};
pub use sparse::{CsrMatrix, SparseError, SparseVector, TermNorm, TfidfVectorizer};
pub use vector_index::{ChunkIndex, FlatIpIndex, HnswParams, SearchResult, VectorIndexError};

use serde::{Deserialize, Serialize};

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
        }
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
