//! Query text normalization
//!
//! Lowercases, strips punctuation and digits, drops English stop words and
//! reduces plural nouns to their singular form. The sparse vectorizer expects
//! text in exactly this shape.

use crate::error::{Result, RetrievalError};
use ahash::AHashSet;
use regex::Regex;

/// Pure text normalization capability consumed by the sparse stages
pub trait TextNormalizer: Send + Sync {
    /// Normalize free text. Empty input yields empty output; never fails.
    fn normalize(&self, text: &str) -> String;
}

/// Regex and stop list based normalizer
pub struct StopwordNormalizer {
    punctuation: Regex,
    digits: Regex,
    stopwords: AHashSet<&'static str>,
}

impl StopwordNormalizer {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                RetrievalError::configuration(format!(
                    "Invalid normalization pattern '{}': {}",
                    pattern, e
                ))
            })
        };

        Ok(Self {
            punctuation: compile(r"[[:punct:]]+")?,
            digits: compile(r"\d+")?,
            stopwords: ENGLISH_STOPWORDS.iter().copied().collect(),
        })
    }

    /// Reduce a plural noun to its singular form
    fn lemmatize(word: &str) -> String {
        if word.len() > 4 && word.ends_with("ies") {
            return format!("{}y", &word[..word.len() - 3]);
        }
        if word.len() > 4
            && ["sses", "ches", "shes", "xes"]
                .iter()
                .any(|suffix| word.ends_with(suffix))
        {
            return word[..word.len() - 2].to_string();
        }
        if word.len() > 3
            && word.ends_with('s')
            && !word.ends_with("ss")
            && !word.ends_with("us")
            && !word.ends_with("is")
        {
            return word[..word.len() - 1].to_string();
        }
        word.to_string()
    }
}

impl TextNormalizer for StopwordNormalizer {
    fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let lowered = text.to_lowercase();
        let without_punct = self.punctuation.replace_all(&lowered, "");
        let without_digits = self.digits.replace_all(&without_punct, "");

        without_digits
            .split_whitespace()
            .filter(|token| !self.stopwords.contains(token))
            .map(Self::lemmatize)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "youre", "youve", "youll",
    "youd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself", "she",
    "shes", "her", "hers", "herself", "it", "its", "itself", "they", "them", "their", "theirs",
    "themselves", "what", "which", "who", "whom", "this", "that", "thatll", "these", "those",
    "am", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "having", "do",
    "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or", "because", "as", "until",
    "while", "of", "at", "by", "for", "with", "about", "against", "between", "into", "through",
    "during", "before", "after", "above", "below", "to", "from", "up", "down", "in", "out", "on",
    "off", "over", "under", "again", "further", "then", "once", "here", "there", "when", "where",
    "why", "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such",
    "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
    "will", "just", "don", "dont", "should", "shouldve", "now", "d", "ll", "m", "o", "re", "ve",
    "y", "ain", "aren", "arent", "couldn", "couldnt", "didn", "didnt", "doesn", "doesnt", "hadn",
    "hadnt", "hasn", "hasnt", "haven", "havent", "isn", "isnt", "ma", "mightn", "mightnt",
    "mustn", "mustnt", "needn", "neednt", "shan", "shant", "shouldn", "shouldnt", "wasn",
    "wasnt", "weren", "werent", "won", "wont", "wouldn", "wouldnt",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let normalizer = StopwordNormalizer::new().unwrap();
        assert_eq!(normalizer.normalize(""), "");
    }

    #[test]
    fn test_stopwords_only_normalize_to_empty() {
        let normalizer = StopwordNormalizer::new().unwrap();
        assert_eq!(normalizer.normalize("What is the, and... 42?"), "");
    }

    #[test]
    fn test_punctuation_digits_and_plurals() {
        let normalizer = StopwordNormalizer::new().unwrap();
        assert_eq!(
            normalizer.normalize("How do Batteries store 3 Charges?"),
            "battery store charge"
        );
    }

    #[test]
    fn test_lemmatize_keeps_short_and_latin_forms() {
        assert_eq!(StopwordNormalizer::lemmatize("bus"), "bus");
        assert_eq!(StopwordNormalizer::lemmatize("class"), "class");
        assert_eq!(StopwordNormalizer::lemmatize("analysis"), "analysis");
        assert_eq!(StopwordNormalizer::lemmatize("boxes"), "box");
        assert_eq!(StopwordNormalizer::lemmatize("dogs"), "dog");
    }
}
