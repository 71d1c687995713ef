//! Dense similarity search and candidate reranking

use crate::dataset::Dataset;
use crate::embedding::DenseTable;
use crate::error::{Result, RetrievalError};
use crate::resources::ResourceRegistry;
use crate::retrieval::{select_top, unique_doc_ids, ScoredResult};
use ndarray::ArrayView1;
use std::sync::Arc;
use std::time::Instant;

/// Scores documents by cosine similarity of their dense embeddings
///
/// Query vectors must be unit length and come from the model the table was
/// built with; the table rows are normalized when it is built.
pub struct DenseReranker {
    registry: Arc<ResourceRegistry>,
}

impl DenseReranker {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    /// Top `top_n` documents of the whole table
    pub fn search_dense(
        &self,
        query_vector: &[f32],
        dataset: Dataset,
        top_n: usize,
    ) -> Result<Vec<ScoredResult>> {
        let table = self.registry.get_dense(dataset)?;
        check_dimension(&table, query_vector)?;

        let start = Instant::now();
        let scores = table.similarities(&ArrayView1::from(query_vector));
        let ranked = select_top(scores.iter().copied().enumerate().collect(), top_n);
        tracing::debug!(
            stage = "dense_search",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scored {} documents",
            table.len()
        );

        Ok(ranked
            .into_iter()
            .map(|(row, score)| ScoredResult::new(table.doc_ids()[row].clone(), score))
            .collect())
    }

    /// Rescore candidate documents and keep the best `top_n`
    ///
    /// Candidates without an embedding are dropped. Repeated ids are scored
    /// once. Equal scores keep candidate order.
    pub fn rerank(
        &self,
        query_vector: &[f32],
        dataset: Dataset,
        candidate_doc_ids: &[String],
        top_n: usize,
    ) -> Result<Vec<ScoredResult>> {
        if candidate_doc_ids.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.registry.get_dense(dataset)?;
        check_dimension(&table, query_vector)?;

        let start = Instant::now();
        let query = ArrayView1::from(query_vector);
        let candidates = unique_doc_ids(candidate_doc_ids.iter().map(String::as_str));

        let mut missing = 0usize;
        let mut scored: Vec<(usize, f32)> = Vec::with_capacity(candidates.len());
        for (order, doc_id) in candidates.iter().enumerate() {
            match table.position(doc_id) {
                Some(row) => scored.push((order, table.similarity(row, &query))),
                None => missing += 1,
            }
        }

        if missing > 0 {
            tracing::debug!(
                dataset = %dataset,
                "{} of {} candidates have no dense embedding and were dropped",
                missing,
                candidates.len()
            );
        }

        let ranked = select_top(scored, top_n);
        tracing::debug!(
            stage = "dense_rerank",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Reranked {} candidates",
            candidates.len() - missing
        );

        Ok(ranked
            .into_iter()
            .map(|(order, score)| ScoredResult::new(candidates[order].clone(), score))
            .collect())
    }
}

fn check_dimension(table: &DenseTable, query_vector: &[f32]) -> Result<()> {
    if !table.is_empty() && table.dimension() != query_vector.len() {
        return Err(RetrievalError::configuration(format!(
            "Query vector has dimension {} but dense embeddings have {}",
            query_vector.len(),
            table.dimension()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::testing::Fixture;

    fn fixture() -> Fixture {
        Fixture::builder(Dataset::Webis)
            .document("a", "solar energy")
            .document("b", "battery storage")
            .document("c", "solar battery storage")
            .without_dense_embedding("b")
            .build()
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.doc_id.as_str()).collect()
    }

    #[test]
    fn test_rerank_drops_missing_candidates() {
        let fixture = fixture();
        let reranker = fixture.dense_reranker();
        let query = fixture.embedder.embed("battery storage").unwrap();

        let candidates = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = reranker
            .rerank(&query, Dataset::Webis, &candidates, 10)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(ids(&results), vec!["c", "a"]);
    }

    #[test]
    fn test_rerank_only_returns_candidates() {
        let fixture = fixture();
        let reranker = fixture.dense_reranker();
        let query = fixture.embedder.embed("solar").unwrap();

        let results = reranker
            .rerank(&query, Dataset::Webis, &["c".to_string(), "c".to_string()], 10)
            .unwrap();
        assert_eq!(ids(&results), vec!["c"]);
    }

    #[test]
    fn test_rerank_ties_keep_candidate_order() {
        let fixture = fixture();
        let reranker = fixture.dense_reranker();
        let query = fixture.embedder.embed("unrelated words").unwrap();

        let candidates = vec!["c".to_string(), "a".to_string()];
        let results = reranker
            .rerank(&query, Dataset::Webis, &candidates, 10)
            .unwrap();
        assert_eq!(ids(&results), vec!["c", "a"]);
    }

    #[test]
    fn test_search_dense_whole_table() {
        let fixture = fixture();
        let reranker = fixture.dense_reranker();
        let query = fixture.embedder.embed("solar energy").unwrap();

        let results = reranker.search_dense(&query, Dataset::Webis, 1).unwrap();
        assert_eq!(ids(&results), vec!["a"]);
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_dimension_mismatch() {
        let fixture = fixture();
        let reranker = fixture.dense_reranker();
        assert!(matches!(
            reranker.search_dense(&[1.0], Dataset::Webis, 3),
            Err(RetrievalError::Configuration(_))
        ));
    }
}
