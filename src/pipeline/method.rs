use crate::error::RetrievalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retrieval strategy of a query
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMethod {
    /// TF-IDF similarity over every document
    Sparse,
    /// Dense embedding similarity over every document
    Dense,
    /// Approximate search over every chunk, above a similarity threshold
    Ann,
    /// Sparse candidates reranked by dense similarity
    Hybrid,
    /// Chunk search restricted to hybrid candidates
    HybridAnn,
    /// Answer grounded in ANN chunks
    AnnGenerate,
    /// Answer grounded in whole hybrid documents
    HybridGenerate,
    /// Answer grounded in chunks of hybrid candidates
    HybridAnnGenerate,
}

impl SearchMethod {
    pub const ALL: [SearchMethod; 8] = [
        SearchMethod::Sparse,
        SearchMethod::Dense,
        SearchMethod::Ann,
        SearchMethod::Hybrid,
        SearchMethod::HybridAnn,
        SearchMethod::AnnGenerate,
        SearchMethod::HybridGenerate,
        SearchMethod::HybridAnnGenerate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SearchMethod::Sparse => "sparse",
            SearchMethod::Dense => "dense",
            SearchMethod::Ann => "ann",
            SearchMethod::Hybrid => "hybrid",
            SearchMethod::HybridAnn => "hybrid-ann",
            SearchMethod::AnnGenerate => "ann-generate",
            SearchMethod::HybridGenerate => "hybrid-generate",
            SearchMethod::HybridAnnGenerate => "hybrid-ann-generate",
        }
    }

    /// Whether the method ends in answer generation
    pub fn is_generative(&self) -> bool {
        matches!(
            self,
            SearchMethod::AnnGenerate
                | SearchMethod::HybridGenerate
                | SearchMethod::HybridAnnGenerate
        )
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchMethod {
    type Err = RetrievalError;

    /// Accepts the method names plus the legacy service names
    /// (`tfidf`, `embedding_faiss`, `rag_with_basics`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        let method = match key.as_str() {
            "sparse" | "tfidf" => SearchMethod::Sparse,
            "dense" | "embedding-brute-force" => SearchMethod::Dense,
            "ann" | "embedding-faiss" => SearchMethod::Ann,
            "hybrid" => SearchMethod::Hybrid,
            "hybrid-ann" | "faiss-with-basics" => SearchMethod::HybridAnn,
            "ann-generate" | "rag-with-faiss" => SearchMethod::AnnGenerate,
            "hybrid-generate" | "rag-with-basics" => SearchMethod::HybridGenerate,
            "hybrid-ann-generate" => SearchMethod::HybridAnnGenerate,
            _ => {
                return Err(RetrievalError::InvalidConfigValue {
                    path: "method".to_string(),
                    message: format!("Invalid method: {}", s),
                })
            }
        };
        Ok(method)
    }
}
