//! Approximate nearest neighbour search over the full chunk index

use crate::dataset::Dataset;
use crate::embedding::{l2_normalize, EmbeddingProvider};
use crate::error::{Result, RetrievalError};
use crate::resources::ResourceRegistry;
use crate::retrieval::{snippet, ScoredResult};
use crate::text::TextNormalizer;
use std::sync::Arc;
use std::time::Instant;

/// Searches every chunk of a dataset, keeping hits above a similarity threshold
pub struct AnnSearcher {
    registry: Arc<ResourceRegistry>,
    normalizer: Arc<dyn TextNormalizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f32,
    snippet_chars: usize,
}

impl AnnSearcher {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        normalizer: Arc<dyn TextNormalizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        similarity_threshold: f32,
        snippet_chars: usize,
    ) -> Self {
        Self {
            registry,
            normalizer,
            embedder,
            similarity_threshold,
            snippet_chars,
        }
    }

    /// Up to `top_k` chunks scoring at least the similarity threshold
    ///
    /// The normalized query is embedded. Snippets are chunk text prefixes.
    pub fn search(
        &self,
        query_text: &str,
        dataset: Dataset,
        top_k: usize,
    ) -> Result<Vec<ScoredResult>> {
        self.search_chunks(query_text, dataset, top_k, Some(self.snippet_chars))
    }

    /// Like [`AnnSearcher::search`], with the whole chunk text as snippet
    pub fn search_full_text(
        &self,
        query_text: &str,
        dataset: Dataset,
        top_k: usize,
    ) -> Result<Vec<ScoredResult>> {
        self.search_chunks(query_text, dataset, top_k, None)
    }

    fn search_chunks(
        &self,
        query_text: &str,
        dataset: Dataset,
        top_k: usize,
        snippet_chars: Option<usize>,
    ) -> Result<Vec<ScoredResult>> {
        let normalized = self.normalizer.normalize(query_text);
        if normalized.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let ann = self.registry.get_ann(dataset)?;

        let start = Instant::now();
        let mut query_vector = self.embedder.embed(&normalized)?;
        l2_normalize(&mut query_vector);
        if !ann.index.is_empty() && query_vector.len() != ann.index.dimension() {
            return Err(RetrievalError::configuration(format!(
                "Query vector has dimension {} but chunk vectors have {}",
                query_vector.len(),
                ann.index.dimension()
            )));
        }

        let hits = ann.index.search(&query_vector, top_k)?;
        tracing::debug!(
            stage = "ann_search",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ANN search returned {} hits",
            hits.len()
        );

        Ok(hits
            .into_iter()
            .filter(|hit| hit.score >= self.similarity_threshold)
            .filter_map(|hit| ann.chunks.get(hit.position).map(|chunk| (chunk, hit.score)))
            .map(|(chunk, score)| {
                let text = match snippet_chars {
                    Some(max_chars) => snippet(&chunk.text, max_chars),
                    None => chunk.text.clone(),
                };
                ScoredResult::new(chunk.doc_id.clone(), score).with_snippet(text)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SNIPPET_CHARS;
    use crate::testing::Fixture;

    fn fixture() -> Fixture {
        Fixture::builder(Dataset::Antique)
            .document("d1", "solar")
            .document("d2", "battery")
            .chunk("d1", "solar solar solar")
            .chunk("d2", "battery storage")
            .chunk("d2", &format!("solar battery {}", "padding ".repeat(40)))
            .build()
    }

    #[test]
    fn test_threshold_filters_weak_hits() {
        let fixture = fixture();
        let searcher = fixture.ann_searcher(0.7);
        let results = searcher.search("solar", Dataset::Antique, 5).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "d1");
        assert!(results[0].score >= 0.7);
    }

    #[test]
    fn test_low_threshold_keeps_more() {
        let fixture = fixture();
        let searcher = fixture.ann_searcher(-1.0);
        let results = searcher.search("solar", Dataset::Antique, 5).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_long_chunk_snippet_truncated() {
        let fixture = fixture();
        let searcher = fixture.ann_searcher(0.0);
        let results = searcher.search("battery solar", Dataset::Antique, 5).unwrap();

        let long = results
            .iter()
            .find(|r| r.snippet.ends_with("..."))
            .unwrap();
        assert_eq!(long.snippet.chars().count(), SNIPPET_CHARS + 3);
    }

    #[test]
    fn test_full_text_keeps_whole_chunk() {
        let fixture = fixture();
        let searcher = fixture.ann_searcher(0.0);
        let results = searcher
            .search_full_text("battery solar", Dataset::Antique, 5)
            .unwrap();
        assert!(results.iter().all(|r| !r.snippet.ends_with("...")));
        assert!(results.iter().any(|r| r.snippet.chars().count() > SNIPPET_CHARS));
    }

    #[test]
    fn test_empty_normalized_query() {
        let fixture = fixture();
        let searcher = fixture.ann_searcher(0.0);
        assert!(searcher.search("the and of", Dataset::Antique, 5).unwrap().is_empty());
    }
}
