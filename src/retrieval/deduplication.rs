//! Result deduplication by document id

use crate::retrieval::ScoredResult;
use ahash::AHashSet;

/// Deduplicate results by doc_id, keeping the first (highest ranked) instance
///
/// # Arguments
/// * `results` - Results sorted best first, potentially with repeated documents
///
/// # Returns
/// Deduplicated results, maintaining score order
pub fn deduplicate_results(results: Vec<ScoredResult>) -> Vec<ScoredResult> {
    let mut seen: AHashSet<String> = AHashSet::with_capacity(results.len());

    results
        .into_iter()
        .filter(|result| seen.insert(result.doc_id.clone()))
        .collect()
}

/// Distinct ids in first-seen order
pub fn unique_doc_ids<'a>(doc_ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: AHashSet<&str> = AHashSet::new();
    doc_ids
        .into_iter()
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
