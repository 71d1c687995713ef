//! Retrieval stages
//!
//! - sparse: TF-IDF cosine similarity over the whole corpus
//! - dense: embedding similarity over the whole table, or a candidate rerank
//! - constrained: exact chunk search inside a candidate document set
//! - ann: approximate chunk search over the whole chunk index
//!
//! Every stage returns [`ScoredResult`]s sorted by score descending, ties
//! broken by original position ascending.

mod ann;
mod constrained;
mod deduplication;
mod ranking;
mod reranker;
mod result;
mod sparse;

pub use ann::AnnSearcher;
pub use constrained::ConstrainedChunkSearcher;
pub use deduplication::{deduplicate_results, unique_doc_ids};
pub use ranking::{compare_ranked, select_top};
pub use reranker::DenseReranker;
pub use result::{snippet, ScoredResult, SNIPPET_CHARS};
pub use sparse::SparseRetriever;
