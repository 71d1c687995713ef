use super::SearchMethod;
use crate::dataset::Dataset;
use crate::generation::{ContextChunk, InstructionKey};
use crate::retrieval::ScoredResult;
use serde::Serialize;

/// One query against one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub dataset: Dataset,
    pub method: SearchMethod,
    /// Overrides the result (or context) depth of the method
    pub top_n: Option<usize>,
    pub instruction: InstructionKey,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, dataset: Dataset, method: SearchMethod) -> Self {
        Self {
            query: query.into(),
            dataset,
            method,
            top_n: None,
            instruction: InstructionKey::Default,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    pub fn with_instruction(mut self, instruction: InstructionKey) -> Self {
        self.instruction = instruction;
        self
    }
}

/// Generated answer and the retrieved text it was offered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub generated_text: String,
    /// Every retrieved piece of context, best first
    pub retrieved_context: Vec<ContextChunk>,
    /// How many of `retrieved_context` fit in the prompt
    pub included_in_prompt: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Ranked { results: Vec<ScoredResult> },
    Generated(GenerationResult),
}

impl SearchResponse {
    /// Ranked results, empty for generated answers
    pub fn results(&self) -> &[ScoredResult] {
        match self {
            SearchResponse::Ranked { results } => results,
            SearchResponse::Generated(_) => &[],
        }
    }

    pub fn generation(&self) -> Option<&GenerationResult> {
        match self {
            SearchResponse::Generated(generation) => Some(generation),
            SearchResponse::Ranked { .. } => None,
        }
    }
}

/// A response with the request it answers
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub dataset: Dataset,
    pub method: SearchMethod,
    pub elapsed_ms: u64,
    pub timestamp: String,
    #[serde(flatten)]
    pub response: SearchResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_shape() {
        let outcome = QueryOutcome {
            query: "solar".to_string(),
            dataset: Dataset::Antique,
            method: SearchMethod::Hybrid,
            elapsed_ms: 12,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            response: SearchResponse::Ranked {
                results: vec![ScoredResult::new("d1", 0.5).with_snippet("text")],
            },
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["method"], "hybrid");
        assert_eq!(json["dataset"], "antique");
        assert_eq!(json["results"][0]["doc_id"], "d1");
        assert_eq!(json["results"][0]["snippet"], "text");
    }

    #[test]
    fn test_generated_json_shape() {
        let outcome = QueryOutcome {
            query: "q".to_string(),
            dataset: Dataset::Webis,
            method: SearchMethod::HybridGenerate,
            elapsed_ms: 1,
            timestamp: String::new(),
            response: SearchResponse::Generated(GenerationResult {
                generated_text: "answer".to_string(),
                retrieved_context: vec![ContextChunk::new("d1", "body", 0.9)],
                included_in_prompt: 1,
            }),
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["generated_text"], "answer");
        assert_eq!(json["retrieved_context"][0]["text"], "body");
        assert!(json.get("results").is_none());
        assert!(outcome.response.results().is_empty());
    }
}
