//! Model Error Types
//!
//! Everything the model façade can fail with. Lower layers keep their own
//! error types; this enum wraps them so callers match on one type.

use crate::db::PersistenceError;
use crate::models::ValidationError;
use crate::operations::NodeOperationError;
use crate::serialization::{JobStatus, PipelineError};
use thiserror::Error;

/// Model operation errors
#[derive(Error, Debug)]
pub enum ModelError {
    /// Structural request rejected; the tree is unchanged
    #[error(transparent)]
    Operation(#[from] NodeOperationError),

    /// Load or save failed at the gateway
    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// Serialization or parsing failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A save found another serialization already running
    #[error("A serialization of {} assertions is already in progress", .0.quad_count)]
    SerializationInProgress(JobStatus),
}

impl From<ValidationError> for ModelError {
    fn from(err: ValidationError) -> Self {
        Self::Operation(err.into())
    }
}

impl ModelError {
    /// Whether the error is a missing-node lookup
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Operation(NodeOperationError::NodeNotFound { .. }))
    }

    /// Whether the error was a timeout (serialization budget or save)
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Pipeline(PipelineError::TimedOut { .. })
                | Self::Persistence(PersistenceError::TimedOut { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_classification() {
        let err: ModelError = NodeOperationError::node_not_found("x").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Node 'x' does not exist");

        let err: ModelError = PersistenceError::timed_out(Duration::from_secs(1)).into();
        assert!(err.is_timeout());
        assert!(!err.is_not_found());

        let err: ModelError = ValidationError::ZeroChunkSize.into();
        assert!(matches!(
            err,
            ModelError::Operation(NodeOperationError::Validation(_))
        ));
    }
}
