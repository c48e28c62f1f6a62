//! Graph Layer
//!
//! The subject–predicate–object view of the tree:
//!
//! - `Namespaces`: vocabulary constants and node IRI conventions
//! - `GraphMirror`: assertion set kept in step with the arena
//! - `rows_from_assertions`: fold parsed assertions back into node rows

pub mod mirror;
pub mod namespaces;
mod rows;

pub use mirror::GraphMirror;
pub use namespaces::{Namespaces, DEFAULT_BASE_URI};
pub use rows::{find_root_id, rows_from_assertions};
