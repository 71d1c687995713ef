//! Chunk search restricted to a candidate document set
//!
//! The full chunk index covers the whole corpus. For each query, the chunks
//! of the candidate documents are copied out of it into a small exact index
//! that lives only for the duration of the call.

use crate::dataset::Dataset;
use crate::embedding::{l2_normalize, EmbeddingProvider, FlatIpIndex};
use crate::error::{Result, RetrievalError};
use crate::resources::ResourceRegistry;
use crate::retrieval::ScoredResult;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

pub struct ConstrainedChunkSearcher {
    registry: Arc<ResourceRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ConstrainedChunkSearcher {
    pub fn new(registry: Arc<ResourceRegistry>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { registry, embedder }
    }

    /// Best `top_k_chunks` chunks belonging to `candidate_doc_ids`
    ///
    /// Each result carries the full chunk text as its snippet. A document may
    /// appear more than once, once per matching chunk.
    pub fn search_constrained_chunks(
        &self,
        query_text: &str,
        dataset: Dataset,
        candidate_doc_ids: &HashSet<String>,
        top_k_chunks: usize,
    ) -> Result<Vec<ScoredResult>> {
        if query_text.trim().is_empty() || candidate_doc_ids.is_empty() || top_k_chunks == 0 {
            return Ok(Vec::new());
        }

        let ann = self.registry.get_ann(dataset)?;

        let start = Instant::now();
        let positions: Vec<usize> = ann
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| candidate_doc_ids.contains(&chunk.doc_id))
            .map(|(position, _)| position)
            .collect();

        if positions.is_empty() {
            tracing::debug!(
                dataset = %dataset,
                "No chunks belong to the {} candidate documents",
                candidate_doc_ids.len()
            );
            return Ok(Vec::new());
        }

        let mut sub_index = FlatIpIndex::new(ann.index.dimension());
        for &position in &positions {
            let vector = ann.index.reconstruct(position)?;
            sub_index.add(&vector)?;
        }
        tracing::debug!(
            stage = "sub_index_build",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built sub-index over {} chunks",
            positions.len()
        );

        let start = Instant::now();
        let mut query_vector = self.embedder.embed(query_text)?;
        l2_normalize(&mut query_vector);
        if query_vector.len() != ann.index.dimension() {
            return Err(RetrievalError::configuration(format!(
                "Query vector has dimension {} but chunk vectors have {}",
                query_vector.len(),
                ann.index.dimension()
            )));
        }

        let hits = sub_index.search(&query_vector, top_k_chunks)?;
        tracing::debug!(
            stage = "sub_index_search",
            dataset = %dataset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Found {} chunks",
            hits.len()
        );

        Ok(hits
            .into_iter()
            .map(|hit| {
                let chunk = &ann.chunks[positions[hit.position]];
                ScoredResult::new(chunk.doc_id.clone(), hit.score).with_snippet(chunk.text.clone())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn fixture() -> Fixture {
        Fixture::builder(Dataset::Antique)
            .document("d1", "solar power")
            .document("d2", "battery storage")
            .document("d3", "wind turbine")
            .chunk("d1", "solar panel output")
            .chunk("d1", "solar inverter")
            .chunk("d2", "battery chemistry")
            .chunk("d3", "solar wind hybrid")
            .build()
    }

    fn candidates(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_results_stay_inside_candidates() {
        let fixture = fixture();
        let searcher = fixture.chunk_searcher();
        let results = searcher
            .search_constrained_chunks("solar", Dataset::Antique, &candidates(&["d1", "d2"]), 10)
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.doc_id == "d1" || r.doc_id == "d2"));
        assert_eq!(results[0].doc_id, "d1");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_snippet_is_chunk_text() {
        let fixture = fixture();
        let searcher = fixture.chunk_searcher();
        let results = searcher
            .search_constrained_chunks("battery", Dataset::Antique, &candidates(&["d2"]), 1)
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "battery chemistry");
    }

    #[test]
    fn test_no_matching_chunks() {
        let fixture = fixture();
        let searcher = fixture.chunk_searcher();
        assert!(searcher
            .search_constrained_chunks("solar", Dataset::Antique, &candidates(&["zz"]), 5)
            .unwrap()
            .is_empty());
        assert!(searcher
            .search_constrained_chunks("", Dataset::Antique, &candidates(&["d1"]), 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_missing_index_is_unavailable() {
        let fixture = fixture();
        let searcher = fixture.chunk_searcher();
        assert!(matches!(
            searcher.search_constrained_chunks("solar", Dataset::Webis, &candidates(&["d1"]), 5),
            Err(RetrievalError::ResourceUnavailable { .. })
        ));
    }
}
