//! Scored result structures

use serde::{Deserialize, Serialize};

/// Default snippet length in characters
pub const SNIPPET_CHARS: usize = 150;

/// A ranked document (or chunk) with its score and display snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    /// Document the result belongs to
    pub doc_id: String,

    /// Similarity score (higher is better)
    pub score: f32,

    /// Display text: a document prefix or the full chunk text
    pub snippet: String,
}

impl ScoredResult {
    /// Result without a snippet yet
    pub fn new(doc_id: impl Into<String>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
            snippet: String::new(),
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// First `max_chars` characters of `text`, with `...` appended when truncated
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(snippet("short", 150), "short");
        assert_eq!(snippet("", 150), "");
    }

    #[test]
    fn test_exact_length_not_truncated() {
        let text = "a".repeat(150);
        assert_eq!(snippet(&text, 150), text);
    }

    #[test]
    fn test_truncation_counts_chars() {
        let text = "é".repeat(200);
        let s = snippet(&text, 150);
        assert_eq!(s.chars().count(), 153);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn test_builder() {
        let r = ScoredResult::new("d1", 0.5).with_snippet("text");
        assert_eq!(r.doc_id, "d1");
        assert_eq!(r.snippet, "text");
    }
}
