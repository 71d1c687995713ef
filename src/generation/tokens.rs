//! Token counting for prompt budgets

use crate::error::{Result, RetrievalError};
use std::path::Path;
use tokenizers::Tokenizer;

/// Length of a text in the generation model's tokens
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Counts tokens with a Hugging Face `tokenizer.json`
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            RetrievalError::configuration(format!(
                "Failed to load tokenizer {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        // Special tokens are not part of the text being budgeted
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::warn!("Tokenization failed, counting words instead: {}", e);
                WhitespaceTokenCounter.count(text)
            }
        }
    }
}

/// Approximates tokens as whitespace separated words
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_counter() {
        let counter = WhitespaceTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("Document (ID: d1): some  text\nhere"), 6);
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let result = HfTokenCounter::from_file(Path::new("/nonexistent/tokenizer.json"));
        assert!(matches!(result, Err(RetrievalError::Configuration(_))));
    }
}
