//! Span producers.
//!
//! A tokenizer lowercases its input into the analyzed buffer and marks
//! `(start, length)` spans in it. Token boundaries never depend on
//! anything but the text, so indexing and query parsing agree on terms.

use std::fmt::Debug;

use crate::analysis::token::{AnalyzedString, Span};

/// Turns text into an analyzed string.
pub trait Tokenizer: Debug + Send + Sync {
    fn analyze(&self, text: &str) -> AnalyzedString;
}

/// Splits on anything that is not alphanumeric, keeping the separators out
/// of the spans.
#[derive(Debug, Default)]
pub struct StandardTokenizer;

impl Tokenizer for StandardTokenizer {
    fn analyze(&self, text: &str) -> AnalyzedString {
        let buffer = text.to_lowercase();
        let mut spans = Vec::new();
        let mut start = None;

        for (at, ch) in buffer.char_indices() {
            if ch.is_alphanumeric() {
                if start.is_none() {
                    start = Some(at);
                }
            } else if let Some(token_start) = start.take() {
                spans.push(Span::new(token_start, at - token_start));
            }
        }
        if let Some(token_start) = start {
            spans.push(Span::new(token_start, buffer.len() - token_start));
        }

        AnalyzedString::new(buffer, spans)
    }
}

/// Emits the whole trimmed value as one span; used for `_`-prefixed
/// single-token fields.
#[derive(Debug, Default)]
pub struct WholeValueTokenizer;

impl Tokenizer for WholeValueTokenizer {
    fn analyze(&self, text: &str) -> AnalyzedString {
        let buffer = text.to_lowercase();
        let trimmed = buffer.trim();
        if trimmed.is_empty() {
            return AnalyzedString::new(buffer, Vec::new());
        }
        let start = trimmed.as_ptr() as usize - buffer.as_ptr() as usize;
        let length = trimmed.len();
        AnalyzedString::new(buffer, vec![Span::new(start, length)])
    }
}
