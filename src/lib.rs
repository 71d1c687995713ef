//! ragline - multi-stage document retrieval and context assembly
//!
//! Answers natural-language queries against precomputed document collections.
//! A query flows through a TF-IDF candidate stage, a dense embedding rerank,
//! a chunk search restricted to the candidates and a token-budgeted prompt
//! assembler, optionally ending in answer generation by a local model.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod resources;
pub mod retrieval;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod text;

pub use error::{Result, RetrievalError};
