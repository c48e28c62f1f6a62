//! Streaming statement parser
//!
//! Text arrives in arbitrary chunks that need not line up with statements.
//! `oxttl`'s push parser keeps the unfinished tail of each chunk and resumes
//! when the next one is fed, so a statement, string or number may straddle any
//! boundary. N-Triples is a subset of Turtle; the same parser reads the worker
//! transfer and stored documents.
//!
//! A statement that fails to parse is recorded as a [`ParseError`] and the
//! parser recovers at the next statement. Triples with blank nodes parse
//! fine but cannot be held by the model; they are rejected the same way.

use crate::models::Assertion;
use crate::serialization::turtle::from_triple;
use crate::serialization::ParseError;
use oxttl::turtle::{LowLevelTurtleParser, TurtleParser};

/// Everything a parse produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub assertions: Vec<Assertion>,
    pub errors: Vec<ParseError>,
}

/// Chunk-tolerant statement parser
pub struct StatementParser {
    reader: LowLevelTurtleParser,
    chunk: usize,
    output: ParseOutput,
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser {
    pub fn new() -> Self {
        Self {
            reader: TurtleParser::new().low_level(),
            chunk: 0,
            output: ParseOutput::default(),
        }
    }

    /// Parse as many complete statements as the buffered text allows
    pub fn feed(&mut self, chunk: &str) {
        self.chunk += 1;
        self.reader.extend_from_slice(chunk.as_bytes());
        self.drain();
    }

    /// Flush the buffer, treating it as the end of input
    pub fn finish(mut self) -> ParseOutput {
        self.reader.end();
        self.drain();
        self.output
    }

    pub fn assertion_count(&self) -> usize {
        self.output.assertions.len()
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.output.errors
    }

    fn drain(&mut self) {
        let chunk = self.chunk.max(1);
        while let Some(result) = self.reader.parse_next() {
            let error = match result {
                Ok(triple) => match from_triple(triple) {
                    Ok(assertion) => {
                        self.output.assertions.push(assertion);
                        continue;
                    }
                    Err(message) => ParseError::new(chunk, None, message),
                },
                Err(e) => {
                    let line = e.location().start.line as usize + 1;
                    ParseError::new(chunk, Some(line), e.message())
                }
            };
            tracing::warn!("Skipping statement: {}", error);
            self.output.errors.push(error);
        }
    }
}

/// Split `text` into pieces of at most `max_bytes`, never inside a character
pub fn split_chunks(text: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(1);
    let mut chunks = Vec::with_capacity(text.len() / max_bytes + 1);
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_bytes).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than max_bytes
            end = start + 1;
            while !text.is_char_boundary(end) {
                end += 1;
            }
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}

/// Parse a complete document in `max_bytes` chunks
pub fn parse_document(text: &str, max_bytes: usize) -> ParseOutput {
    let mut parser = StatementParser::new();
    for chunk in split_chunks(text, max_bytes) {
        parser.feed(chunk);
    }
    parser.finish()
}
