//! Grounded answer generation
//!
//! Retrieved text is packed into a prompt under a token budget
//! ([`ContextAssembler`]) and handed to a [`Generator`].

mod ollama;
mod prompt;
mod tokens;

pub use ollama::{OllamaGenerator, OllamaSettings};
pub use prompt::{AssembledPrompt, ContextAssembler, ContextChunk, InstructionKey, SAFETY_MARGIN};
pub use tokens::{HfTokenCounter, TokenCounter, WhitespaceTokenCounter};

use thiserror::Error;

/// Answer text returned in place of a failed generation
pub const GENERATION_FAILED: &str = "Error generating response.";

/// Answer text returned when retrieval found nothing to ground an answer on
pub const NO_DOCUMENTS_FOUND: &str = "Could not find any relevant documents to generate an answer.";

/// Context text used for a retrieved document missing from the document store
pub const CONTENT_NOT_FOUND: &str = "Content not found.";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator initialization failed: {0}")]
    InitializationError(String),

    #[error("Generation request failed: {0}")]
    RequestError(String),

    #[error("Generation timed out")]
    Timeout,

    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),
}

/// Text generation backend
pub trait Generator: Send + Sync {
    /// Continue `prompt`, producing at most `max_new_tokens` tokens
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}
