//! The analyzed-string representation.

/// A token's position inside the analyzed buffer, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub length: usize,
}

impl Span {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }
}

/// A normalized character buffer plus the token spans found in it.
#[derive(Debug, Clone)]
pub struct AnalyzedString {
    buffer: String,
    spans: Vec<Span>,
}

impl AnalyzedString {
    pub fn new(buffer: String, spans: Vec<Span>) -> Self {
        Self { buffer, spans }
    }

    /// The normalized buffer the spans index into.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn token_count(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Iterate the token strings.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.spans
            .iter()
            .map(|span| &self.buffer[span.start..span.start + span.length])
    }
}
