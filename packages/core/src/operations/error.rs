//! Error types for structural tree operations
//!
//! Every structural error is raised before the arena is touched, so callers
//! can treat a returned error as "nothing happened".

use crate::models::ValidationError;
use thiserror::Error;

/// Errors that can occur during tree operations
///
/// # Examples
///
/// ```rust
/// use trestle_core::operations::NodeOperationError;
///
/// let err = NodeOperationError::node_not_found("nid-404");
/// assert_eq!(err.to_string(), "Node 'nid-404' does not exist");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeOperationError {
    /// Referenced node does not exist
    ///
    /// Occurs when an operation names a node, parent or target absent from the arena.
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: String },

    /// Malformed structural request (bad index, zero chunk size, moving the root)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Move would place a node beneath itself
    ///
    /// Moving a node under one of its own descendants would detach the subtree
    /// into a cycle unreachable from the root.
    #[error("Circular reference: node '{node_id}' cannot be moved under '{new_parent_id}'")]
    CircularReference {
        node_id: String,
        new_parent_id: String,
    },

    /// Flat rows could not be folded into a tree because no root was present
    #[error("No root node present in loaded data")]
    MissingRoot,

    /// The arena holds no root (for example after the root itself was deleted)
    #[error("Tree is empty")]
    EmptyTree,
}

impl NodeOperationError {
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    pub fn circular_reference(node_id: impl Into<String>, new_parent_id: impl Into<String>) -> Self {
        Self::CircularReference {
            node_id: node_id.into(),
            new_parent_id: new_parent_id.into(),
        }
    }

    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::Validation(ValidationError::IndexOutOfRange { index, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_not_found_error() {
        let err = NodeOperationError::node_not_found("missing-node");
        assert!(matches!(err, NodeOperationError::NodeNotFound { .. }));
        assert_eq!(format!("{}", err), "Node 'missing-node' does not exist");
    }

    #[test]
    fn test_circular_reference_error() {
        let err = NodeOperationError::circular_reference("a", "b");
        assert_eq!(
            format!("{}", err),
            "Circular reference: node 'a' cannot be moved under 'b'"
        );
    }

    #[test]
    fn test_validation_error_wraps() {
        let err = NodeOperationError::index_out_of_range(5, 2);
        assert_eq!(
            format!("{}", err),
            "Validation error: Index 5 is out of range for a child list of length 2"
        );
        let err: NodeOperationError = ValidationError::ZeroChunkSize.into();
        assert!(matches!(
            err,
            NodeOperationError::Validation(ValidationError::ZeroChunkSize)
        ));
    }
}
