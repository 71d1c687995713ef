//! Query orchestration
//!
//! A [`Pipeline`] composes the retrieval stages into the [`SearchMethod`]
//! variants:
//!
//! - sparse, dense and ann: one stage each
//! - hybrid: wide sparse candidate set reranked by dense similarity
//! - hybrid-ann: chunk search restricted to the hybrid candidates
//! - *-generate: the retrieved text packed into a prompt and answered
//!
//! Ranked outputs are deduplicated by document and get their snippets from a
//! single batched document store lookup after final ranking.

mod method;
mod response;

pub use method::SearchMethod;
pub use response::{GenerationResult, QueryOutcome, QueryRequest, SearchResponse};

use crate::dataset::Dataset;
use crate::embedding::{l2_normalize, EmbeddingProvider};
use crate::error::{Result, RetrievalError};
use crate::generation::{
    ContextAssembler, ContextChunk, Generator, InstructionKey, CONTENT_NOT_FOUND,
    GENERATION_FAILED, NO_DOCUMENTS_FOUND,
};
use crate::resources::ResourceRegistry;
use crate::retrieval::{
    deduplicate_results, snippet, AnnSearcher, ConstrainedChunkSearcher, DenseReranker,
    ScoredResult, SparseRetriever, SNIPPET_CHARS,
};
use crate::text::TextNormalizer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Depths and budgets of every stage
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Results of the ranked document methods
    pub top_n: usize,
    /// Sparse candidates handed to the dense reranker
    pub hybrid_sparse_candidates: usize,
    /// Hybrid documents whose chunks are searched
    pub hybrid_ann_candidates: usize,
    /// Chunks returned by the restricted chunk search
    pub top_k_chunks: usize,
    /// Whole documents offered to document-level generation
    pub top_k_context: usize,
    /// Chunks returned by plain ANN search
    pub ann_top_k: usize,
    pub ann_similarity_threshold: f32,
    pub snippet_chars: usize,
    pub max_context_tokens: usize,
    pub max_new_tokens: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            hybrid_sparse_candidates: 1000,
            hybrid_ann_candidates: 50,
            top_k_chunks: 10,
            top_k_context: 3,
            ann_top_k: 5,
            ann_similarity_threshold: 0.7,
            snippet_chars: SNIPPET_CHARS,
            max_context_tokens: 512,
            max_new_tokens: 150,
        }
    }
}

/// Multi-stage retrieval pipeline
///
/// Holds no per-query state; one instance serves concurrent callers.
pub struct Pipeline {
    registry: Arc<ResourceRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
    sparse: SparseRetriever,
    dense: DenseReranker,
    chunks: ConstrainedChunkSearcher,
    ann: AnnSearcher,
    assembler: ContextAssembler,
    generator: Option<Arc<dyn Generator>>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        normalizer: Arc<dyn TextNormalizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        assembler: ContextAssembler,
        generator: Option<Arc<dyn Generator>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            sparse: SparseRetriever::new(Arc::clone(&registry), Arc::clone(&normalizer)),
            dense: DenseReranker::new(Arc::clone(&registry)),
            chunks: ConstrainedChunkSearcher::new(Arc::clone(&registry), Arc::clone(&embedder)),
            ann: AnnSearcher::new(
                Arc::clone(&registry),
                normalizer,
                Arc::clone(&embedder),
                settings.ann_similarity_threshold,
                settings.snippet_chars,
            ),
            registry,
            embedder,
            assembler,
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn generation_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Run one request with the method it names
    pub fn run(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let span = tracing::info_span!(
            "query",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            dataset = %request.dataset
        );
        let _guard = span.enter();
        let start = Instant::now();

        let query = request.query.as_str();
        let dataset = request.dataset;
        let instruction = request.instruction;
        let s = &self.settings;
        let depth = |default: usize| request.top_n.unwrap_or(default);

        let response = match request.method {
            SearchMethod::Sparse => SearchResponse::Ranked {
                results: self.sparse(query, dataset, depth(s.top_n))?,
            },
            SearchMethod::Dense => SearchResponse::Ranked {
                results: self.dense(query, dataset, depth(s.top_n))?,
            },
            SearchMethod::Ann => SearchResponse::Ranked {
                results: self.ann(query, dataset, depth(s.ann_top_k))?,
            },
            SearchMethod::Hybrid => SearchResponse::Ranked {
                results: self.hybrid(query, dataset, depth(s.top_n))?,
            },
            SearchMethod::HybridAnn => SearchResponse::Ranked {
                results: self.hybrid_ann(query, dataset, depth(s.top_k_chunks))?,
            },
            SearchMethod::AnnGenerate => SearchResponse::Generated(self.ann_generate(
                query,
                dataset,
                depth(s.ann_top_k),
                instruction,
            )?),
            SearchMethod::HybridGenerate => SearchResponse::Generated(self.hybrid_generate(
                query,
                dataset,
                depth(s.top_k_context),
                instruction,
            )?),
            SearchMethod::HybridAnnGenerate => SearchResponse::Generated(
                self.hybrid_ann_generate(query, dataset, depth(s.top_k_chunks), instruction)?,
            ),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(elapsed_ms, "Query finished");

        Ok(QueryOutcome {
            query: request.query.clone(),
            dataset,
            method: request.method,
            elapsed_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
            response,
        })
    }

    /// TF-IDF ranking with document snippets
    pub fn sparse(&self, query: &str, dataset: Dataset, top_n: usize) -> Result<Vec<ScoredResult>> {
        let results = self.sparse.search_sparse(query, dataset, top_n, None)?;
        Ok(self.attach_snippets(dataset, deduplicate_results(results)))
    }

    /// Dense ranking over the whole embedding table with document snippets
    pub fn dense(&self, query: &str, dataset: Dataset, top_n: usize) -> Result<Vec<ScoredResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embed_query(query)?;
        let results = self.dense.search_dense(&query_vector, dataset, top_n)?;
        Ok(self.attach_snippets(dataset, deduplicate_results(results)))
    }

    /// Thresholded chunk search, one result per document
    pub fn ann(&self, query: &str, dataset: Dataset, top_k: usize) -> Result<Vec<ScoredResult>> {
        Ok(deduplicate_results(self.ann.search(query, dataset, top_k)?))
    }

    /// Sparse candidates reranked by dense similarity, with document snippets
    pub fn hybrid(&self, query: &str, dataset: Dataset, top_n: usize) -> Result<Vec<ScoredResult>> {
        let ranked = self.hybrid_ranked(query, dataset, top_n)?;
        Ok(self.attach_snippets(dataset, ranked))
    }

    /// Chunks of the hybrid candidates, one result per document
    ///
    /// Snippets are the text of each document's best chunk.
    pub fn hybrid_ann(
        &self,
        query: &str,
        dataset: Dataset,
        top_k_chunks: usize,
    ) -> Result<Vec<ScoredResult>> {
        Ok(deduplicate_results(self.hybrid_chunks(
            query,
            dataset,
            top_k_chunks,
        )?))
    }

    /// Answer grounded in chunks found by thresholded ANN search
    pub fn ann_generate(
        &self,
        query: &str,
        dataset: Dataset,
        top_k: usize,
        instruction: InstructionKey,
    ) -> Result<GenerationResult> {
        let generator = self.generator()?;
        let hits = self.ann.search_full_text(query, dataset, top_k)?;
        Ok(self.generate_answer(generator, query, to_context(hits), instruction))
    }

    /// Answer grounded in the full text of the best hybrid documents
    pub fn hybrid_generate(
        &self,
        query: &str,
        dataset: Dataset,
        top_k_context: usize,
        instruction: InstructionKey,
    ) -> Result<GenerationResult> {
        let generator = self.generator()?;
        let ranked = self.hybrid_ranked(query, dataset, top_k_context)?;
        if ranked.is_empty() {
            return Ok(self.generate_answer(generator, query, Vec::new(), instruction));
        }

        let ids: Vec<String> = ranked.iter().map(|r| r.doc_id.clone()).collect();
        let start = Instant::now();
        let texts = self
            .registry
            .document_store()
            .get_documents_batch(dataset, &ids)?;
        tracing::debug!(
            stage = "context_fetch",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched {} of {} context documents",
            texts.len(),
            ids.len()
        );

        let context = ranked
            .into_iter()
            .map(|result| {
                let text = texts
                    .get(&result.doc_id)
                    .cloned()
                    .unwrap_or_else(|| CONTENT_NOT_FOUND.to_string());
                ContextChunk::new(result.doc_id, text, result.score)
            })
            .collect();
        Ok(self.generate_answer(generator, query, context, instruction))
    }

    /// Answer grounded in chunks of the hybrid candidates
    pub fn hybrid_ann_generate(
        &self,
        query: &str,
        dataset: Dataset,
        top_k_chunks: usize,
        instruction: InstructionKey,
    ) -> Result<GenerationResult> {
        let generator = self.generator()?;
        let chunks = self.hybrid_chunks(query, dataset, top_k_chunks)?;
        Ok(self.generate_answer(generator, query, to_context(chunks), instruction))
    }

    /// Full text of one document
    pub fn get_document(&self, dataset: Dataset, doc_id: &str) -> Result<Option<String>> {
        self.registry.document_store().get_document(dataset, doc_id)
    }

    fn generator(&self) -> Result<&Arc<dyn Generator>> {
        self.generator.as_ref().ok_or_else(|| {
            RetrievalError::configuration("Generation is disabled (set generation.enabled = true)")
        })
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let mut vector = self.embedder.embed(query)?;
        l2_normalize(&mut vector);
        tracing::debug!(
            stage = "query_embedding",
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Embedded query with {}",
            self.embedder.model_name()
        );
        Ok(vector)
    }

    /// Hybrid ranking without snippets
    fn hybrid_ranked(
        &self,
        query: &str,
        dataset: Dataset,
        top_n: usize,
    ) -> Result<Vec<ScoredResult>> {
        let wide = self.settings.hybrid_sparse_candidates;
        let candidates = self.sparse.search_sparse(query, dataset, wide, Some(wide))?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_ids: Vec<String> = candidates.into_iter().map(|r| r.doc_id).collect();
        let query_vector = self.embed_query(query)?;
        let reranked = self
            .dense
            .rerank(&query_vector, dataset, &candidate_ids, top_n)?;
        Ok(deduplicate_results(reranked))
    }

    /// Restricted chunk search over the hybrid candidates, every chunk kept
    fn hybrid_chunks(
        &self,
        query: &str,
        dataset: Dataset,
        top_k_chunks: usize,
    ) -> Result<Vec<ScoredResult>> {
        let candidates =
            self.hybrid_ranked(query, dataset, self.settings.hybrid_ann_candidates)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_ids: HashSet<String> = candidates.into_iter().map(|r| r.doc_id).collect();
        self.chunks
            .search_constrained_chunks(query, dataset, &candidate_ids, top_k_chunks)
    }

    /// Replace each result's snippet with a prefix of its document text
    ///
    /// A failing document store leaves snippets empty rather than failing the
    /// query.
    fn attach_snippets(&self, dataset: Dataset, results: Vec<ScoredResult>) -> Vec<ScoredResult> {
        if results.is_empty() {
            return results;
        }

        let ids: Vec<String> = results.iter().map(|r| r.doc_id.clone()).collect();
        let start = Instant::now();
        let texts = match self
            .registry
            .document_store()
            .get_documents_batch(dataset, &ids)
        {
            Ok(texts) => texts,
            Err(e) => {
                tracing::warn!(dataset = %dataset, "Could not fetch snippets: {}", e);
                HashMap::new()
            }
        };
        tracing::debug!(
            stage = "snippets",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched {} snippets",
            texts.len()
        );

        results
            .into_iter()
            .map(|result| {
                let text = texts
                    .get(&result.doc_id)
                    .map(|text| snippet(text, self.settings.snippet_chars))
                    .unwrap_or_default();
                result.with_snippet(text)
            })
            .collect()
    }

    fn generate_answer(
        &self,
        generator: &Arc<dyn Generator>,
        query: &str,
        context: Vec<ContextChunk>,
        instruction: InstructionKey,
    ) -> GenerationResult {
        if context.is_empty() {
            tracing::info!("Nothing retrieved, skipping generation");
            return GenerationResult {
                generated_text: NO_DOCUMENTS_FOUND.to_string(),
                retrieved_context: Vec::new(),
                included_in_prompt: 0,
            };
        }

        let start = Instant::now();
        let assembled =
            self.assembler
                .assemble(&context, query, instruction, self.settings.max_context_tokens);
        tracing::debug!(
            stage = "prompt_assembly",
            elapsed_ms = start.elapsed().as_millis() as u64,
            context_tokens = assembled.context_tokens,
            "Assembled prompt with {} of {} chunks",
            assembled.included.len(),
            context.len()
        );

        let start = Instant::now();
        let generated_text =
            match generator.generate(&assembled.prompt, self.settings.max_new_tokens) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(model = generator.model_name(), "Generation failed: {}", e);
                    GENERATION_FAILED.to_string()
                }
            };
        tracing::debug!(
            stage = "generation",
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generated {} characters",
            generated_text.len()
        );

        GenerationResult {
            generated_text,
            included_in_prompt: assembled.included.len(),
            retrieved_context: context,
        }
    }
}

fn to_context(results: Vec<ScoredResult>) -> Vec<ContextChunk> {
    results
        .into_iter()
        .map(|r| ContextChunk::new(r.doc_id, r.snippet, r.score))
        .collect()
}
