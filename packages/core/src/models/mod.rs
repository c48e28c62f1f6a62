//! Data Models
//!
//! This module contains the core data structures used throughout Trestle:
//!
//! - `Node` - Arena-owned tree element (title, description, ordered children, position)
//! - `NodeUpdate` - Partial field update for existing nodes
//! - `NodeRow` - Flat record exchanged with persistence gateways
//! - `Assertion` / `Term` - Subject–predicate–object facts kept by the graph mirror

mod assertion;
mod node;

pub use assertion::{Assertion, Term};
pub use node::{Node, NodeKind, NodeRow, NodeUpdate, ValidationError, NODE_ID_PREFIX, ROOT_ID_PREFIX};
