//! Persistence Error Types
//!
//! Errors surfaced by a `PersistenceGateway`. The core reports them unchanged
//! and never retries; retry policy belongs to the gateway.

use std::time::Duration;
use thiserror::Error;

/// Persistence gateway errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Transport-level failure reported by the gateway (HTTP status, endpoint down, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The save did not settle within its budget
    #[error("Save timed out after {}ms", after.as_millis())]
    TimedOut { after: Duration },

    /// The task running the save panicked or was cancelled
    #[error("Persistence task failed: {0}")]
    Task(String),
}

impl PersistenceError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::TimedOut { after }
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PersistenceError::transport("503 Service Unavailable");
        assert_eq!(err.to_string(), "Transport error: 503 Service Unavailable");

        let err = PersistenceError::timed_out(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Save timed out after 30000ms");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PersistenceError = io.into();
        assert!(matches!(err, PersistenceError::Io(_)));
    }
}
