//! Lexical candidate retrieval over the TF-IDF matrix

use crate::dataset::Dataset;
use crate::error::Result;
use crate::resources::ResourceRegistry;
use crate::retrieval::{select_top, ScoredResult};
use crate::text::TextNormalizer;
use std::sync::Arc;
use std::time::Instant;

/// Scores every document of a dataset against a query by TF-IDF cosine similarity
pub struct SparseRetriever {
    registry: Arc<ResourceRegistry>,
    normalizer: Arc<dyn TextNormalizer>,
}

impl SparseRetriever {
    pub fn new(registry: Arc<ResourceRegistry>, normalizer: Arc<dyn TextNormalizer>) -> Self {
        Self {
            registry,
            normalizer,
        }
    }

    /// Top `top_n` documents by sparse similarity, without snippets
    ///
    /// With `top_k_prefilter` smaller than the corpus, the scores are first
    /// partitioned down to that many candidates before sorting. Both paths
    /// share one total order so the prefilter never changes the outcome.
    pub fn search_sparse(
        &self,
        query_text: &str,
        dataset: Dataset,
        top_n: usize,
        top_k_prefilter: Option<usize>,
    ) -> Result<Vec<ScoredResult>> {
        let normalized = self.normalizer.normalize(query_text);
        if normalized.is_empty() {
            tracing::debug!("Query normalized to nothing, no sparse candidates");
            return Ok(Vec::new());
        }

        let resources = self.registry.get_sparse(dataset)?;

        let start = Instant::now();
        let query_vector = resources.vectorizer.transform(&normalized);
        let similarities = resources.matrix.dot_all(&query_vector);
        tracing::debug!(
            stage = "sparse_scoring",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            terms = query_vector.nnz(),
            "Scored {} documents",
            similarities.len()
        );

        let corpus_size = similarities.len();
        let keep = match top_k_prefilter {
            Some(k) if k > 0 && k < corpus_size => k,
            _ => corpus_size,
        };

        let start = Instant::now();
        let mut ranked = select_top(similarities.into_iter().enumerate().collect(), keep);
        ranked.truncate(top_n);
        tracing::debug!(
            stage = "sparse_top_n",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Selected {} of {} candidates",
            ranked.len(),
            keep
        );

        Ok(ranked
            .into_iter()
            .map(|(row, score)| ScoredResult::new(resources.doc_ids[row].clone(), score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn fixture() -> Fixture {
        Fixture::builder(Dataset::Antique)
            .document("d1", "solar panels convert sunlight into electricity")
            .document("d2", "batteries store electricity for later use")
            .document("d3", "solar batteries store solar electricity")
            .document("d4", "cooking pasta requires boiling water")
            .build()
    }

    #[test]
    fn test_ranks_by_similarity() {
        let fixture = fixture();
        let retriever = fixture.sparse_retriever();
        let results = retriever
            .search_sparse("solar electricity", Dataset::Antique, 3, None)
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].doc_id, "d3");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.snippet.is_empty()));
    }

    #[test]
    fn test_empty_normalized_query() {
        let fixture = fixture();
        let retriever = fixture.sparse_retriever();
        assert!(retriever
            .search_sparse("the of and", Dataset::Antique, 5, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_out_of_vocabulary_query_returns_corpus_order() {
        let fixture = fixture();
        let retriever = fixture.sparse_retriever();
        let results = retriever
            .search_sparse("zeppelin", Dataset::Antique, 2, None)
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert!(results.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_prefilter_larger_than_corpus_is_noop() {
        let fixture = fixture();
        let retriever = fixture.sparse_retriever();
        let plain = retriever
            .search_sparse("store electricity", Dataset::Antique, 4, None)
            .unwrap();
        let prefiltered = retriever
            .search_sparse("store electricity", Dataset::Antique, 4, Some(1000))
            .unwrap();
        assert_eq!(plain, prefiltered);

        let zero = retriever
            .search_sparse("store electricity", Dataset::Antique, 4, Some(0))
            .unwrap();
        assert_eq!(plain, zero);
    }

    #[test]
    fn test_prefilter_caps_candidates() {
        let fixture = fixture();
        let retriever = fixture.sparse_retriever();
        let results = retriever
            .search_sparse("store electricity", Dataset::Antique, 10, Some(2))
            .unwrap();
        assert_eq!(results.len(), 2);
    }
}
