//! In-memory collaborators for tests
//!
//! Unit tests inside the crate and the integration tests under `tests/` build
//! their corpora with [`Fixture`], which wires a [`ResourceRegistry`] to a
//! hash map document store, a static resource loader and a keyword embedder.
//! Helpers here panic on malformed fixtures instead of returning errors.

use crate::dataset::Dataset;
use crate::embedding::{
    l2_normalize, ChunkIndex, CsrMatrix, DenseTable, EmbeddingError, EmbeddingProvider,
    HnswParams, TermNorm, TfidfVectorizer,
};
use crate::error::{Result, RetrievalError};
use crate::generation::{
    ContextAssembler, GenerationError, Generator, TokenCounter, WhitespaceTokenCounter,
};
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::resources::{
    AnnResources, ChunkRecord, ResourceKind, ResourceLoader, ResourceRegistry, SparseArtifacts,
};
use crate::retrieval::{AnnSearcher, ConstrainedChunkSearcher, DenseReranker, SparseRetriever};
use crate::storage::DocumentStore;
use crate::text::{StopwordNormalizer, TextNormalizer};
use ahash::AHashSet;
use ndarray::Array2;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Document store backed by per-dataset vectors
///
/// Insertion order is the canonical document order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: HashMap<Dataset, Vec<(String, String)>>,
    failing: AtomicBool,
    /// Number of `get_documents_batch` calls served
    pub batch_calls: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new(dataset: Dataset, documents: Vec<(String, String)>) -> Self {
        Self::default().with_dataset(dataset, documents)
    }

    pub fn with_dataset(mut self, dataset: Dataset, documents: Vec<(String, String)>) -> Self {
        self.documents.insert(dataset, documents);
        self
    }

    /// Document texts of a dataset in canonical order
    pub fn texts(&self, dataset: Dataset) -> Vec<String> {
        self.documents
            .get(&dataset)
            .map(|docs| docs.iter().map(|(_, text)| text.clone()).collect())
            .unwrap_or_default()
    }

    /// Make every batch lookup fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get_documents_batch(
        &self,
        dataset: Dataset,
        doc_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("document store is offline").into());
        }

        let wanted: AHashSet<&str> = doc_ids.iter().map(String::as_str).collect();
        Ok(self
            .documents
            .get(&dataset)
            .into_iter()
            .flatten()
            .filter(|(id, _)| wanted.contains(id.as_str()))
            .map(|(id, text)| (id.clone(), text.clone()))
            .collect())
    }

    fn load_doc_ids(&self, dataset: Dataset) -> Result<Vec<String>> {
        Ok(self
            .documents
            .get(&dataset)
            .map(|docs| docs.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default())
    }
}

/// Bag-of-words embedder over a fixed vocabulary
///
/// Texts are normalized like queries, counted against the vocabulary and
/// scaled to unit length, so cosine similarity reflects shared terms. Text
/// with no known term embeds to the zero vector.
pub struct KeywordEmbedder {
    normalizer: StopwordNormalizer,
    vocabulary: HashMap<String, usize>,
}

impl KeywordEmbedder {
    /// Vocabulary is every normalized term of `texts`, sorted
    pub fn from_corpus<'a>(texts: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let normalizer = StopwordNormalizer::new()?;
        let terms: BTreeSet<String> = texts
            .into_iter()
            .flat_map(|text| {
                normalizer
                    .normalize(text)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(Self {
            normalizer,
            vocabulary: terms.into_iter().enumerate().map(|(i, t)| (t, i)).collect(),
        })
    }
}

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.vocabulary.len()];
        for term in self.normalizer.normalize(text).split_whitespace() {
            if let Some(&col) = self.vocabulary.get(term) {
                vector[col] += 1.0;
            }
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

/// Resource loader serving prebuilt in-memory resources
///
/// Datasets without an entry fail with `ResourceUnavailable`, like missing
/// artifact files.
#[derive(Default)]
pub struct StaticLoader {
    sparse: HashMap<Dataset, SparseArtifacts>,
    dense: HashMap<Dataset, DenseTable>,
    ann: HashMap<Dataset, (Array2<f32>, Vec<ChunkRecord>)>,
    pub sparse_loads: AtomicUsize,
    pub dense_loads: AtomicUsize,
    pub ann_loads: AtomicUsize,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sparse(mut self, dataset: Dataset, artifacts: SparseArtifacts) -> Self {
        self.sparse.insert(dataset, artifacts);
        self
    }

    pub fn with_dense(mut self, dataset: Dataset, table: DenseTable) -> Self {
        self.dense.insert(dataset, table);
        self
    }

    /// Chunk vectors are indexed on every load
    pub fn with_ann(
        mut self,
        dataset: Dataset,
        vectors: Array2<f32>,
        chunks: Vec<ChunkRecord>,
    ) -> Self {
        self.ann.insert(dataset, (vectors, chunks));
        self
    }
}

fn unavailable(dataset: Dataset, resource: ResourceKind) -> RetrievalError {
    RetrievalError::ResourceUnavailable {
        dataset,
        resource,
        reason: "no fixture registered".to_string(),
    }
}

impl ResourceLoader for StaticLoader {
    fn load_sparse(&self, dataset: Dataset) -> Result<SparseArtifacts> {
        self.sparse_loads.fetch_add(1, Ordering::SeqCst);
        self.sparse
            .get(&dataset)
            .cloned()
            .ok_or_else(|| unavailable(dataset, ResourceKind::Sparse))
    }

    fn load_dense(&self, dataset: Dataset) -> Result<DenseTable> {
        self.dense_loads.fetch_add(1, Ordering::SeqCst);
        self.dense
            .get(&dataset)
            .cloned()
            .ok_or_else(|| unavailable(dataset, ResourceKind::Dense))
    }

    fn load_ann(&self, dataset: Dataset) -> Result<AnnResources> {
        self.ann_loads.fetch_add(1, Ordering::SeqCst);
        let (vectors, chunks) = self
            .ann
            .get(&dataset)
            .ok_or_else(|| unavailable(dataset, ResourceKind::Ann))?;
        let index = ChunkIndex::build(vectors.clone(), HnswParams::default())?;
        AnnResources::new(index, chunks.clone())
    }
}

/// Generator returning a fixed reply, or always failing
pub struct ScriptedGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(
        &self,
        prompt: &str,
        _max_new_tokens: usize,
    ) -> std::result::Result<String, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| GenerationError::RequestError("scripted failure".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Fit a TF-IDF model on whitespace-tokenized, already normalized texts
///
/// Smoothed idf `ln((1 + n) / (1 + df)) + 1`, raw term frequency and
/// L2-normalized rows. Columns follow the sorted vocabulary.
///
/// # Panics
///
/// Never for well-formed input; the fitted buffers always validate.
pub fn fit_tfidf(texts: &[String]) -> (TfidfVectorizer, CsrMatrix) {
    let terms: BTreeSet<&str> = texts
        .iter()
        .flat_map(|text| text.split_whitespace())
        .collect();
    let vocabulary: HashMap<String, usize> = terms
        .iter()
        .enumerate()
        .map(|(col, term)| (term.to_string(), col))
        .collect();

    let mut df = vec![0usize; vocabulary.len()];
    let mut counted_rows: Vec<Vec<(usize, f32)>> = Vec::with_capacity(texts.len());
    for text in texts {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for term in text.split_whitespace() {
            *counts.entry(vocabulary[term]).or_insert(0.0) += 1.0;
        }
        for &col in counts.keys() {
            df[col] += 1;
        }
        let mut row: Vec<(usize, f32)> = counts.into_iter().collect();
        row.sort_unstable_by_key(|(col, _)| *col);
        counted_rows.push(row);
    }

    let n = texts.len() as f32;
    let idf: Vec<f32> = df
        .iter()
        .map(|&d| ((1.0 + n) / (1.0 + d as f32)).ln() + 1.0)
        .collect();

    let mut data = Vec::new();
    let mut indices = Vec::new();
    let mut indptr = vec![0];
    for row in counted_rows {
        let mut values: Vec<f32> = row.iter().map(|&(col, tf)| tf * idf[col]).collect();
        l2_normalize(&mut values);
        indices.extend(row.iter().map(|&(col, _)| col));
        data.extend(values);
        indptr.push(data.len());
    }

    let matrix = CsrMatrix::new((texts.len(), idf.len()), data, indices, indptr)
        .expect("fitted CSR buffers are consistent");
    let vectorizer = TfidfVectorizer::new(vocabulary, idf, false, TermNorm::L2)
        .expect("fitted vocabulary indexes idf");
    (vectorizer, matrix)
}

/// A single-dataset corpus with every resource kind loaded from memory
pub struct Fixture {
    pub dataset: Dataset,
    pub store: Arc<MemoryDocumentStore>,
    pub loader: Arc<StaticLoader>,
    pub registry: Arc<ResourceRegistry>,
    pub normalizer: Arc<dyn TextNormalizer>,
    pub embedder: Arc<KeywordEmbedder>,
}

impl Fixture {
    pub fn builder(dataset: Dataset) -> FixtureBuilder {
        FixtureBuilder {
            dataset,
            documents: Vec::new(),
            chunks: Vec::new(),
            without_dense: AHashSet::new(),
        }
    }

    pub fn sparse_retriever(&self) -> SparseRetriever {
        SparseRetriever::new(Arc::clone(&self.registry), Arc::clone(&self.normalizer))
    }

    pub fn dense_reranker(&self) -> DenseReranker {
        DenseReranker::new(Arc::clone(&self.registry))
    }

    pub fn chunk_searcher(&self) -> ConstrainedChunkSearcher {
        ConstrainedChunkSearcher::new(Arc::clone(&self.registry), self.embedder.clone())
    }

    pub fn ann_searcher(&self, similarity_threshold: f32) -> AnnSearcher {
        AnnSearcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.normalizer),
            self.embedder.clone(),
            similarity_threshold,
            crate::retrieval::SNIPPET_CHARS,
        )
    }

    /// Pipeline counting prompt tokens as words
    pub fn pipeline(
        &self,
        settings: PipelineSettings,
        generator: Option<Arc<dyn Generator>>,
    ) -> Pipeline {
        self.pipeline_with_embedder(self.embedder.clone(), settings, generator)
    }

    /// Same as [`Fixture::pipeline`] with a different query embedder
    pub fn pipeline_with_embedder(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: PipelineSettings,
        generator: Option<Arc<dyn Generator>>,
    ) -> Pipeline {
        let counter: Arc<dyn TokenCounter> = Arc::new(WhitespaceTokenCounter);
        Pipeline::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.normalizer),
            embedder,
            ContextAssembler::new(counter),
            generator,
            settings,
        )
    }
}

pub struct FixtureBuilder {
    dataset: Dataset,
    documents: Vec<(String, String)>,
    chunks: Vec<ChunkRecord>,
    without_dense: AHashSet<String>,
}

impl FixtureBuilder {
    pub fn document(mut self, doc_id: &str, text: &str) -> Self {
        self.documents.push((doc_id.to_string(), text.to_string()));
        self
    }

    /// Add a chunk. Without any, every document is indexed as one chunk.
    pub fn chunk(mut self, doc_id: &str, text: &str) -> Self {
        self.chunks.push(ChunkRecord {
            doc_id: doc_id.to_string(),
            text: text.to_string(),
        });
        self
    }

    /// Leave a document out of the dense table
    pub fn without_dense_embedding(mut self, doc_id: &str) -> Self {
        self.without_dense.insert(doc_id.to_string());
        self
    }

    /// # Panics
    ///
    /// When the fixture corpus is empty or inconsistent.
    pub fn build(self) -> Fixture {
        let FixtureBuilder {
            dataset,
            documents,
            chunks,
            without_dense,
        } = self;

        let chunks = if chunks.is_empty() {
            documents
                .iter()
                .map(|(id, text)| ChunkRecord {
                    doc_id: id.clone(),
                    text: text.clone(),
                })
                .collect()
        } else {
            chunks
        };

        let normalizer = StopwordNormalizer::new().expect("stop word patterns compile");
        let embedder = KeywordEmbedder::from_corpus(
            documents
                .iter()
                .map(|(_, text)| text.as_str())
                .chain(chunks.iter().map(|chunk| chunk.text.as_str())),
        )
        .expect("keyword embedder builds");

        let normalized: Vec<String> = documents
            .iter()
            .map(|(_, text)| normalizer.normalize(text))
            .collect();
        let (vectorizer, matrix) = fit_tfidf(&normalized);

        let dense_docs: Vec<&(String, String)> = documents
            .iter()
            .filter(|(id, _)| !without_dense.contains(id))
            .collect();
        let dense = DenseTable::new(
            embedding_rows(
                &embedder,
                dense_docs.iter().map(|(_, text)| text.as_str()),
            ),
            dense_docs.iter().map(|(id, _)| id.clone()).collect(),
        )
        .expect("dense rows match ids");

        let chunk_vectors =
            embedding_rows(&embedder, chunks.iter().map(|chunk| chunk.text.as_str()));

        let loader = Arc::new(
            StaticLoader::new()
                .with_sparse(
                    dataset,
                    SparseArtifacts {
                        vectorizer,
                        matrix,
                        doc_ids_fingerprint: None,
                    },
                )
                .with_dense(dataset, dense)
                .with_ann(dataset, chunk_vectors, chunks),
        );
        let store = Arc::new(MemoryDocumentStore::new(dataset, documents));
        let registry = Arc::new(ResourceRegistry::new(loader.clone(), store.clone()));

        Fixture {
            dataset,
            store,
            loader,
            registry,
            normalizer: Arc::new(normalizer),
            embedder: Arc::new(embedder),
        }
    }
}

fn embedding_rows<'a>(
    embedder: &KeywordEmbedder,
    texts: impl Iterator<Item = &'a str>,
) -> Array2<f32> {
    let rows: Vec<Vec<f32>> = texts
        .map(|text| embedder.embed(text).expect("keyword embedding never fails"))
        .collect();
    let dimension = embedder.dimension();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((flat.len() / dimension.max(1), dimension), flat)
        .expect("rows share the vocabulary dimension")
}
