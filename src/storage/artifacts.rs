//! On-disk precomputed artifacts
//!
//! Every artifact is a JSON document, optionally zstd-compressed with a
//! `.zst` suffix. The plain file wins when both exist.

use crate::dataset::Dataset;
use crate::embedding::{ChunkIndex, CsrMatrix, DenseTable, HnswParams, TfidfVectorizer};
use crate::error::{Result, RetrievalError};
use crate::resources::{AnnResources, ChunkRecord, ResourceKind, ResourceLoader, SparseArtifacts};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CSR term-weight matrix as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixArtifact {
    /// `[rows, cols]`
    pub shape: [usize; 2],
    pub data: Vec<f32>,
    pub indices: Vec<usize>,
    pub indptr: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ids_fingerprint: Option<String>,
}

/// Row-major vector table as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorArtifact {
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

impl VectorArtifact {
    fn into_array(self) -> std::result::Result<Array2<f32>, String> {
        let rows = self.vectors.len();
        let mut flat = Vec::with_capacity(rows * self.dimension);
        for (i, vector) in self.vectors.into_iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(format!(
                    "vector {} has {} components, expected {}",
                    i,
                    vector.len(),
                    self.dimension
                ));
            }
            flat.extend(vector);
        }
        Array2::from_shape_vec((rows, self.dimension), flat).map_err(|e| e.to_string())
    }
}

/// Where each dataset's artifacts live
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub data_dir: PathBuf,
    pub sparse_dir: String,
    pub dense_dir: String,
    pub ann_dir: String,
}

impl ArtifactLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            sparse_dir: "TF_IDF".to_string(),
            dense_dir: "Embedding".to_string(),
            ann_dir: "ANN_Indices".to_string(),
        }
    }

    pub fn vectorizer(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(&self.sparse_dir)
            .join(dataset.name())
            .join(format!("{}_tfidf_vectorizer.json", dataset))
    }

    pub fn matrix(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(&self.sparse_dir)
            .join(dataset.name())
            .join(format!("{}_tfidf_matrix.json", dataset))
    }

    pub fn embeddings(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(&self.dense_dir)
            .join(dataset.name())
            .join(format!("{}_embeddings.json", dataset))
    }

    pub fn embedding_ids(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(&self.dense_dir)
            .join(dataset.name())
            .join(format!("{}_ids.json", dataset))
    }

    pub fn ann_vectors(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(&self.ann_dir)
            .join(format!("{}_ann_vectors.json", dataset))
    }

    pub fn ann_metadata(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(&self.ann_dir)
            .join(format!("{}_metadata.json", dataset))
    }
}

/// Loads artifacts from an [`ArtifactLayout`]
pub struct ArtifactLoader {
    layout: ArtifactLayout,
    hnsw: HnswParams,
}

impl ArtifactLoader {
    pub fn new(layout: ArtifactLayout, hnsw: HnswParams) -> Self {
        Self { layout, hnsw }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }
}

impl ResourceLoader for ArtifactLoader {
    fn load_sparse(&self, dataset: Dataset) -> Result<SparseArtifacts> {
        let kind = ResourceKind::Sparse;
        let vectorizer: TfidfVectorizer =
            read_artifact(dataset, kind, &self.layout.vectorizer(dataset))?;
        vectorizer
            .validate()
            .map_err(|e| malformed(dataset, kind, e))?;

        let raw: MatrixArtifact = read_artifact(dataset, kind, &self.layout.matrix(dataset))?;
        let mut matrix = CsrMatrix::new(
            (raw.shape[0], raw.shape[1]),
            raw.data,
            raw.indices,
            raw.indptr,
        )
        .map_err(|e| malformed(dataset, kind, e))?;
        matrix.normalize_rows();

        Ok(SparseArtifacts {
            vectorizer,
            matrix,
            doc_ids_fingerprint: raw.doc_ids_fingerprint,
        })
    }

    fn load_dense(&self, dataset: Dataset) -> Result<DenseTable> {
        let kind = ResourceKind::Dense;
        let raw: VectorArtifact = read_artifact(dataset, kind, &self.layout.embeddings(dataset))?;
        let doc_ids: Vec<String> =
            read_artifact(dataset, kind, &self.layout.embedding_ids(dataset))?;

        let embeddings = raw.into_array().map_err(|e| malformed(dataset, kind, e))?;
        let rows = embeddings.nrows();
        let id_count = doc_ids.len();

        DenseTable::new(embeddings, doc_ids).ok_or_else(|| {
            RetrievalError::configuration(format!(
                "{}: {} dense embeddings but {} ids",
                dataset, rows, id_count
            ))
        })
    }

    fn load_ann(&self, dataset: Dataset) -> Result<AnnResources> {
        let kind = ResourceKind::Ann;
        let raw: VectorArtifact = read_artifact(dataset, kind, &self.layout.ann_vectors(dataset))?;
        let chunks: Vec<ChunkRecord> =
            read_artifact(dataset, kind, &self.layout.ann_metadata(dataset))?;

        let vectors = raw.into_array().map_err(|e| malformed(dataset, kind, e))?;
        let index = ChunkIndex::build(vectors, self.hnsw)?;

        AnnResources::new(index, chunks)
    }
}

fn malformed(dataset: Dataset, kind: ResourceKind, e: impl std::fmt::Display) -> RetrievalError {
    RetrievalError::configuration(format!("{}: malformed {} artifact: {}", dataset, kind, e))
}

fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".zst");
    PathBuf::from(name)
}

/// Read one artifact, falling back to its zstd-compressed sibling
fn read_artifact<T: DeserializeOwned>(
    dataset: Dataset,
    kind: ResourceKind,
    path: &Path,
) -> Result<T> {
    let compressed = compressed_path(path);

    let bytes = if path.exists() {
        std::fs::read(path).map_err(|e| RetrievalError::Io {
            source: e,
            context: format!("Failed to read artifact {}", path.display()),
        })?
    } else if compressed.exists() {
        let raw = std::fs::read(&compressed).map_err(|e| RetrievalError::Io {
            source: e,
            context: format!("Failed to read artifact {}", compressed.display()),
        })?;
        zstd::decode_all(&raw[..]).map_err(|e| RetrievalError::Io {
            source: e,
            context: format!("Failed to decompress artifact {}", compressed.display()),
        })?
    } else {
        return Err(RetrievalError::ResourceUnavailable {
            dataset,
            resource: kind,
            reason: format!("artifact not found: {}", path.display()),
        });
    };

    tracing::debug!("Read {} bytes from {}", bytes.len(), path.display());

    serde_json::from_slice(&bytes).map_err(|e| malformed(dataset, kind, e))
}
