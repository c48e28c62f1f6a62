//! Serialization Error Types

use std::time::Duration;
use thiserror::Error;

/// A statement that could not be parsed
///
/// Recovered locally: the statement is skipped and parsing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("chunk {chunk}{}: {message}", line.map(|l| format!(", line {}", l)).unwrap_or_default())]
pub struct ParseError {
    /// 1-based chunk being parsed when the error surfaced
    pub chunk: usize,
    /// 1-based line of the offending text, when the parser knows it
    pub line: Option<usize>,
    pub message: String,
}

impl ParseError {
    pub fn new(chunk: usize, line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            chunk,
            line,
            message: message.into(),
        }
    }
}

/// Serialization pipeline errors
///
/// Every variant leaves the pipeline back in its idle state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The background worker could not be started or stopped talking
    #[error("Worker error: {0}")]
    Worker(String),

    /// The job exceeded its size-scaled budget and the worker was terminated
    #[error("Serialization timed out after {}ms ({quad_count} assertions)", after.as_millis())]
    TimedOut { after: Duration, quad_count: usize },

    /// The snapshot could not be written, or the worker reported a failure
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Non-empty input produced no assertions at all
    #[error("Failed to parse document: {errors} statement(s) rejected, first: {message}")]
    Parse { errors: usize, message: String },
}

impl PipelineError {
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
