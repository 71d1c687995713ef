//! Per-dataset precomputed resources, loaded lazily and shared
//!
//! Three resource kinds exist per dataset:
//! - sparse: fitted TF-IDF vectorizer, CSR matrix and the canonical doc id order
//! - dense: per-document embedding table
//! - ann: chunk vector index plus chunk metadata
//!
//! The [`ResourceRegistry`] loads each `(dataset, kind)` at most once per
//! process. Concurrent first requests for the same key wait on a per-key lock
//! while one of them loads; a failed load leaves the slot empty so the next
//! request retries.

use crate::dataset::Dataset;
use crate::embedding::{ChunkIndex, CsrMatrix, DenseTable, TfidfVectorizer};
use crate::error::{Result, RetrievalError};
use crate::storage::{doc_ids_fingerprint, DocumentStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::Instant;

/// Kind of precomputed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Sparse,
    Dense,
    Ann,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Sparse => "sparse",
            ResourceKind::Dense => "dense",
            ResourceKind::Ann => "ann",
        };
        f.write_str(name)
    }
}

/// One passage of a document in the chunk index
///
/// Its position in the metadata sequence is its identity and equals the
/// position of its vector in the [`ChunkIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub text: String,
}

/// Sparse artifacts as read from disk, before alignment with the document store
#[derive(Clone)]
pub struct SparseArtifacts {
    pub vectorizer: TfidfVectorizer,
    pub matrix: CsrMatrix,
    /// Fingerprint of the doc id sequence the matrix was built against
    pub doc_ids_fingerprint: Option<String>,
}

/// Sparse resources aligned with the document store
pub struct SparseResources {
    pub vectorizer: TfidfVectorizer,
    pub matrix: CsrMatrix,
    /// `doc_ids[row]` is the document of matrix row `row`
    pub doc_ids: Vec<String>,
}

/// Chunk index with its metadata
pub struct AnnResources {
    pub index: ChunkIndex,
    pub chunks: Vec<ChunkRecord>,
}

impl AnnResources {
    /// Pair an index with its metadata, checking they describe the same chunks
    pub fn new(index: ChunkIndex, chunks: Vec<ChunkRecord>) -> Result<Self> {
        if index.len() != chunks.len() {
            return Err(RetrievalError::configuration(format!(
                "Chunk index holds {} vectors but metadata lists {} chunks",
                index.len(),
                chunks.len()
            )));
        }
        Ok(Self { index, chunks })
    }
}

/// Source of precomputed resources
pub trait ResourceLoader: Send + Sync {
    fn load_sparse(&self, dataset: Dataset) -> Result<SparseArtifacts>;

    fn load_dense(&self, dataset: Dataset) -> Result<DenseTable>;

    fn load_ann(&self, dataset: Dataset) -> Result<AnnResources>;
}

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Load-once cells keyed by dataset
struct Slots<T> {
    cells: RwLock<HashMap<Dataset, Slot<T>>>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, dataset: Dataset) -> Slot<T> {
        if let Some(slot) = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dataset)
        {
            return Arc::clone(slot);
        }

        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(dataset).or_default())
    }

    fn get_or_load(&self, dataset: Dataset, load: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
        let slot = self.slot(dataset);
        // Held for the whole load so concurrent callers wait instead of loading twice
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(resource) = guard.as_ref() {
            return Ok(Arc::clone(resource));
        }

        let resource = Arc::new(load()?);
        *guard = Some(Arc::clone(&resource));
        Ok(resource)
    }

    fn peek(&self, dataset: Dataset) -> Option<Arc<T>> {
        let slot = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dataset)
            .cloned()?;
        // A slot being loaded right now counts as not resident
        let guard = match slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        guard.as_ref().map(Arc::clone)
    }
}

/// Process-wide cache of per-dataset resources
pub struct ResourceRegistry {
    loader: Arc<dyn ResourceLoader>,
    store: Arc<dyn DocumentStore>,
    sparse: Slots<SparseResources>,
    dense: Slots<DenseTable>,
    ann: Slots<AnnResources>,
}

impl ResourceRegistry {
    pub fn new(loader: Arc<dyn ResourceLoader>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            loader,
            store,
            sparse: Slots::new(),
            dense: Slots::new(),
            ann: Slots::new(),
        }
    }

    /// Document store the sparse row order is aligned with
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn get_sparse(&self, dataset: Dataset) -> Result<Arc<SparseResources>> {
        self.sparse.get_or_load(dataset, || {
            timed_load(dataset, ResourceKind::Sparse, || {
                let artifacts = self.loader.load_sparse(dataset)?;
                let doc_ids = self.store.load_doc_ids(dataset)?;
                align_sparse(dataset, artifacts, doc_ids)
            })
        })
    }

    pub fn get_dense(&self, dataset: Dataset) -> Result<Arc<DenseTable>> {
        self.dense.get_or_load(dataset, || {
            timed_load(dataset, ResourceKind::Dense, || {
                let table = self.loader.load_dense(dataset)?;
                if let Some(ann) = self.ann.peek(dataset) {
                    check_dimensions(dataset, table.dimension(), ann.index.dimension())?;
                }
                Ok(table)
            })
        })
    }

    pub fn get_ann(&self, dataset: Dataset) -> Result<Arc<AnnResources>> {
        self.ann.get_or_load(dataset, || {
            timed_load(dataset, ResourceKind::Ann, || {
                let ann = self.loader.load_ann(dataset)?;
                if let Some(dense) = self.dense.peek(dataset) {
                    check_dimensions(dataset, dense.dimension(), ann.index.dimension())?;
                }
                Ok(ann)
            })
        })
    }

    /// Whether a resource is already resident
    pub fn is_loaded(&self, dataset: Dataset, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Sparse => self.sparse.peek(dataset).is_some(),
            ResourceKind::Dense => self.dense.peek(dataset).is_some(),
            ResourceKind::Ann => self.ann.peek(dataset).is_some(),
        }
    }
}

fn timed_load<T>(
    dataset: Dataset,
    kind: ResourceKind,
    load: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let start = Instant::now();
    match load() {
        Ok(resource) => {
            tracing::info!(
                dataset = %dataset,
                resource = %kind,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Loaded resources"
            );
            Ok(resource)
        }
        Err(e) => {
            tracing::error!(dataset = %dataset, resource = %kind, "Failed to load resources: {}", e);
            Err(e)
        }
    }
}

/// Check the sparse matrix rows line up with the document store's id order
fn align_sparse(
    dataset: Dataset,
    artifacts: SparseArtifacts,
    doc_ids: Vec<String>,
) -> Result<SparseResources> {
    let SparseArtifacts {
        vectorizer,
        matrix,
        doc_ids_fingerprint: expected,
    } = artifacts;

    if vectorizer.n_features() != matrix.cols() {
        return Err(RetrievalError::configuration(format!(
            "{}: vectorizer has {} features but the matrix has {} columns",
            dataset,
            vectorizer.n_features(),
            matrix.cols()
        )));
    }

    if matrix.rows() != doc_ids.len() {
        return Err(RetrievalError::configuration(format!(
            "{}: sparse matrix has {} rows but the document store lists {} documents",
            dataset,
            matrix.rows(),
            doc_ids.len()
        )));
    }

    if let Some(expected) = expected {
        let actual = doc_ids_fingerprint(&doc_ids);
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(RetrievalError::configuration(format!(
                "{}: document order differs from the one the sparse matrix was built with \
                 (fingerprint {} != {})",
                dataset, actual, expected
            )));
        }
    }

    Ok(SparseResources {
        vectorizer,
        matrix,
        doc_ids,
    })
}

fn check_dimensions(dataset: Dataset, dense: usize, ann: usize) -> Result<()> {
    if dense != ann {
        return Err(RetrievalError::configuration(format!(
            "{}: dense embeddings have dimension {} but chunk vectors have {}",
            dataset, dense, ann
        )));
    }
    Ok(())
}
