//! Text analysis.
//!
//! The analysis pipeline turns a field value into an
//! [`AnalyzedString`](token::AnalyzedString): a normalized character
//! buffer plus `(start, length)` token spans, and one deterministic
//! unit-length embedding vector per span.
//!
//! ```text
//! Value → normalize → spans → (token strings, embeddings)
//! ```
//!
//! Fields whose name starts with a single `_` are indexed as one token
//! covering the whole value.
//!
//! # Modules
//!
//! - [`token`] - the analyzed-string representation
//! - [`tokenizer`] - span producers
//! - [`embedder`] - token embedding derivation
//! - [`registry`] - media-type registry for payload codecs

pub mod embedder;
pub mod registry;
pub mod token;
pub mod tokenizer;

use std::sync::Arc;

use crate::analysis::embedder::{CharBagEmbedder, Embedder};
use crate::analysis::token::AnalyzedString;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer, WholeValueTokenizer};
use crate::data::is_single_token_field;
use crate::index::vector::Vector;

/// The analyzer wires a tokenizer pair to an embedder and applies the
/// field sigil rules.
#[derive(Debug, Clone)]
pub struct Analyzer {
    standard: Arc<dyn Tokenizer>,
    whole_value: Arc<dyn Tokenizer>,
    embedder: Arc<dyn Embedder>,
}

impl Analyzer {
    pub fn new(embedding_dimension: usize) -> Self {
        Self {
            standard: Arc::new(StandardTokenizer),
            whole_value: Arc::new(WholeValueTokenizer),
            embedder: Arc::new(CharBagEmbedder::new(embedding_dimension)),
        }
    }

    /// Analyze one field value, honoring the single-token sigil.
    pub fn analyze(&self, field: &str, text: &str) -> AnalyzedString {
        let tokenizer = if is_single_token_field(field) {
            &self.whole_value
        } else {
            &self.standard
        };
        tokenizer.analyze(text)
    }

    /// Tokenize free query text with the standard tokenizer.
    pub fn analyze_query_value(&self, field: &str, text: &str) -> AnalyzedString {
        self.analyze(field, text)
    }

    /// The embedding of one token string. Identical tokens always yield
    /// identical vectors.
    pub fn embed(&self, token: &str) -> Vector {
        self.embedder.embed(token)
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_fields_split() {
        let analyzer = Analyzer::new(64);
        let analyzed = analyzer.analyze("title", "The Rain Man");
        let tokens: Vec<&str> = analyzed.tokens().collect();
        assert_eq!(tokens, vec!["the", "rain", "man"]);
    }

    #[test]
    fn test_single_token_fields_stay_whole() {
        let analyzer = Analyzer::new(64);
        let analyzed = analyzer.analyze("_id", "SIR-0042 b");
        let tokens: Vec<&str> = analyzed.tokens().collect();
        assert_eq!(tokens, vec!["sir-0042 b"]);
    }

    #[test]
    fn test_embeddings_deterministic() {
        let analyzer = Analyzer::new(64);
        let a = analyzer.embed("rambo");
        let b = analyzer.embed("rambo");
        assert_eq!(a, b);
    }
}
