//! Token-budgeted prompt assembly

use super::TokenCounter;
use crate::retrieval::compare_ranked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Tokens kept free on top of the instruction and question framing
pub const SAFETY_MARGIN: usize = 50;

/// System instruction variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKey {
    #[default]
    Default,
    Comparative,
    BulletPoints,
    BeginnerFriendly,
}

impl InstructionKey {
    pub fn name(&self) -> &'static str {
        match self {
            InstructionKey::Default => "default",
            InstructionKey::Comparative => "comparative",
            InstructionKey::BulletPoints => "bullet_points",
            InstructionKey::BeginnerFriendly => "beginner_friendly",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            InstructionKey::Default => {
                "You are a helpful assistant. Based on the provided context, answer the question. \
                 If the context does not contain enough information, state that the documents did \
                 not contain the answer. Summarize the relevant points from the context to form \
                 your answer."
            }
            InstructionKey::Comparative => {
                "You are a highly analytical assistant. Your primary goal is to compare and \
                 contrast concepts from the provided context. Structure your answer to clearly \
                 highlight the similarities and differences."
            }
            InstructionKey::BulletPoints => {
                "You are a concise assistant. Your task is to answer the question by extracting \
                 key information from the context and presenting it as a bulleted list. Keep each \
                 point brief and to the point."
            }
            InstructionKey::BeginnerFriendly => {
                "You are a friendly and patient teacher. Explain the answer to the user's question \
                 in simple, easy-to-understand terms. Use analogies if they help clarify complex \
                 topics from the context."
            }
        }
    }

    /// Look up a key by name; unknown names select [`InstructionKey::Default`]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "default" => InstructionKey::Default,
            "comparative" => InstructionKey::Comparative,
            "bullet_points" => InstructionKey::BulletPoints,
            "beginner_friendly" => InstructionKey::BeginnerFriendly,
            other => {
                tracing::debug!("Unknown instruction key '{}', using default", other);
                InstructionKey::Default
            }
        }
    }
}

impl From<&str> for InstructionKey {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl fmt::Display for InstructionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A piece of retrieved text offered to the prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub doc_id: String,
    pub text: String,
    pub score: f32,
}

impl ContextChunk {
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            score,
        }
    }

    fn render(&self) -> String {
        format!("Document (ID: {}): {}", self.doc_id, self.text)
    }
}

/// A rendered prompt and the chunks that made it in
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub prompt: String,
    /// Accepted chunks, best first
    pub included: Vec<ContextChunk>,
    /// Tokens spent on the accepted chunks
    pub context_tokens: usize,
}

/// Packs the best chunks into a fixed token budget
///
/// Chunks are taken best first while they fit; the first chunk that would
/// overflow the budget ends packing, even if a later, shorter one would fit.
pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
}

impl ContextAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn assemble(
        &self,
        chunks: &[ContextChunk],
        query: &str,
        instruction_key: InstructionKey,
        max_tokens: usize,
    ) -> AssembledPrompt {
        let instruction = instruction_key.instruction();
        let framing = format!("{}\n\nQuestion: {}\nAnswer:", instruction, query);
        let reserved = self.counter.count(&framing);
        let available = max_tokens
            .saturating_sub(reserved)
            .saturating_sub(SAFETY_MARGIN);

        let mut order: Vec<(usize, f32)> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, chunk.score))
            .collect();
        order.sort_by(compare_ranked);

        let mut parts = vec!["Context:".to_string()];
        let mut included = Vec::new();
        let mut context_tokens = 0usize;

        for (i, _) in order {
            let chunk = &chunks[i];
            let rendered = chunk.render();
            let tokens = self.counter.count(&rendered);
            if context_tokens + tokens > available {
                break;
            }
            context_tokens += tokens;
            parts.push(rendered);
            included.push(chunk.clone());
        }

        tracing::debug!(
            reserved,
            available,
            context_tokens,
            "Packed {} of {} chunks into the prompt",
            included.len(),
            chunks.len()
        );

        let context = parts.join("\n\n");
        AssembledPrompt {
            prompt: format!(
                "{}\n\n{}\n\nQuestion: {}\nAnswer:",
                instruction, context, query
            ),
            included,
            context_tokens,
        }
    }

    /// Prompt text only
    pub fn assemble_prompt(
        &self,
        chunks: &[ContextChunk],
        query: &str,
        instruction_key: InstructionKey,
        max_tokens: usize,
    ) -> String {
        self.assemble(chunks, query, instruction_key, max_tokens)
            .prompt
    }
}
