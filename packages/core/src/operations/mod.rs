//! Tree Operations
//!
//! Structural algorithms shared by the node arena, the loader and the graph
//! mirror. All of them are iterative (explicit worklists, no call recursion)
//! so arbitrarily deep hierarchies are safe.

pub mod error;
pub mod tree_operations;

pub use error::NodeOperationError;
pub use tree_operations::{
    ChunkProgress, NodeMap, TreeDeletion, TreeOperations, TreeStructure, DEFAULT_TREE_CHUNK_SIZE,
};
