//! Node Data Structures
//!
//! This module defines the `Node` record owned by the node arena together with
//! the partial-update and flat-row shapes used to mutate and reload it.
//!
//! # Architecture
//!
//! - **Arena-owned**: Nodes live in a single id-keyed map; relations are ids, never pointers
//! - **Ordered children**: `children` is document order; `index` mirrors the node's offset
//! - **Weak parent**: `parent` is a lookup key only, `None` exactly for the root
//!
//! # Examples
//!
//! ```rust
//! use trestle_core::models::{Node, NodeKind};
//!
//! let root = Node::new_root("root-1".to_string());
//! assert_eq!(root.node_type, NodeKind::Root);
//! assert!(root.is_root());
//!
//! let child = Node::new_child(
//!     "nid-1".to_string(),
//!     root.id.clone(),
//!     Some("First item".to_string()),
//!     0,
//! );
//! assert_eq!(child.parent.as_deref(), Some("root-1"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Id prefix for generated root nodes
pub const ROOT_ID_PREFIX: &str = "root";

/// Id prefix for generated ordinary nodes
pub const NODE_ID_PREFIX: &str = "nid";

/// Validation errors for structural requests
///
/// Raised before any mutation is applied, so a rejected request never leaves
/// partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Index {index} is out of range for a child list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("Root node '{node_id}' cannot be moved")]
    RootCannotMove { node_id: String },

    #[error("Node id must not be empty")]
    EmptyId,

    #[error("Node '{node_id}' already exists")]
    DuplicateId { node_id: String },

    #[error("Root node '{node_id}' has no siblings")]
    RootHasNoSiblings { node_id: String },
}

/// Tag distinguishing the single root from ordinary nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "RootNode")]
    Root,
    #[serde(rename = "Node")]
    Node,
}

impl NodeKind {
    /// Local name used for the `rdf:type` object in the `ts:` namespace
    pub fn local_name(&self) -> &'static str {
        match self {
            NodeKind::Root => "RootNode",
            NodeKind::Node => "Node",
        }
    }

    /// Resolve a `ts:` local name back to a kind
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "RootNode" => Some(NodeKind::Root),
            "Node" => Some(NodeKind::Node),
            _ => None,
        }
    }
}

/// A single addressable element of the tree.
///
/// # Fields
///
/// - `id`: Opaque unique identifier (`root-<uuid>` / `nid-<uuid>` when generated)
/// - `node_type`: Root marker or ordinary node
/// - `title`, `description`: Optional text payload
/// - `created`: Creation timestamp, set once
/// - `parent`: Parent id (lookup only), `None` for the root
/// - `children`: Ordered child ids (document order)
/// - `index`: Offset of this node within its parent's `children`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,

    #[serde(rename = "type")]
    pub node_type: NodeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default)]
    pub children: Vec<String>,

    #[serde(default)]
    pub index: usize,
}

impl Node {
    /// Create a root node with no payload
    pub fn new_root(id: String) -> Self {
        Self {
            id,
            node_type: NodeKind::Root,
            title: None,
            description: None,
            created: None,
            parent: None,
            children: Vec::new(),
            index: 0,
        }
    }

    /// Create an ordinary node stamped with the current time
    pub fn new_child(id: String, parent: String, title: Option<String>, index: usize) -> Self {
        Self {
            id,
            node_type: NodeKind::Node,
            title,
            description: None,
            created: Some(Utc::now()),
            parent: Some(parent),
            children: Vec::new(),
            index,
        }
    }

    /// Generate a fresh id of the form `<prefix>-<uuid>`
    pub fn generate_id(prefix: &str) -> String {
        format!("{}-{}", prefix, Uuid::new_v4())
    }

    pub fn is_root(&self) -> bool {
        self.node_type == NodeKind::Root
    }

    /// Apply a partial update in place. Topology fields are never touched.
    pub fn apply(&mut self, update: NodeUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
    }
}

/// Accepts both plain values and explicit nulls for double-Option fields.
///
/// - Missing field → None (don't update)
/// - null → Some(None) (clear)
/// - "value" → Some(Some("value")) (set)
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial node update for `update_node`
///
/// Uses the double-Option pattern so that "leave alone" and "clear" are distinct:
///
/// - `None`: Don't change this field
/// - `Some(None)`: Clear the field
/// - `Some(Some(value))`: Set the field
///
/// # Examples
///
/// ```rust
/// # use trestle_core::models::NodeUpdate;
/// let update = NodeUpdate::new().with_title("Groceries");
/// assert!(!update.is_empty());
///
/// let clear = NodeUpdate {
///     description: Some(None),
///     ..Default::default()
/// };
/// assert!(!clear.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub title: Option<Option<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub description: Option<Option<String>>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(Some(title.into()));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(Some(description.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

/// Flat node record as returned by a persistence gateway
///
/// Rows carry a parent reference and a position but no child list; the tree
/// is rebuilt from them by `TreeOperations::build_tree_structure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRow {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl NodeRow {
    pub fn new(id: impl Into<String>, node_type: NodeKind) -> Self {
        Self {
            id: id.into(),
            node_type,
            title: None,
            description: None,
            created: None,
            index: None,
            parent: None,
        }
    }

    /// Convert into an arena node with an empty child list
    pub fn into_node(self) -> Node {
        Node {
            id: self.id,
            node_type: self.node_type,
            title: self.title,
            description: self.description,
            created: self.created,
            parent: self.parent,
            children: Vec::new(),
            index: self.index.unwrap_or(0),
        }
    }
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type,
            title: node.title.clone(),
            description: node.description.clone(),
            created: node.created,
            index: (!node.is_root()).then_some(node.index),
            parent: node.parent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_uses_prefix() {
        let id = Node::generate_id(NODE_ID_PREFIX);
        assert!(id.starts_with("nid-"));
        assert_ne!(id, Node::generate_id(NODE_ID_PREFIX));
    }

    #[test]
    fn test_apply_update_sets_and_clears() {
        let mut node = Node::new_child("n1".into(), "r".into(), Some("Old".into()), 0);
        node.description = Some("keep me?".into());

        node.apply(NodeUpdate {
            title: Some(Some("New".into())),
            description: Some(None),
        });

        assert_eq!(node.title.as_deref(), Some("New"));
        assert!(node.description.is_none());
        assert_eq!(node.parent.as_deref(), Some("r"));
    }

    #[test]
    fn test_update_deserializes_null_as_clear() {
        let update: NodeUpdate = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(update.description, Some(None));
        assert!(update.title.is_none());

        let update: NodeUpdate = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(update.title, Some(Some("x".to_string())));
    }

    #[test]
    fn test_node_kind_serializes_as_type_local_name() {
        let root = Node::new_root("root-1".into());
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["type"], "RootNode");
        assert!(json.get("parent").is_none());
        assert_eq!(NodeKind::from_local_name("Node"), Some(NodeKind::Node));
        assert_eq!(NodeKind::from_local_name("Other"), None);
    }

    #[test]
    fn test_row_round_trip_drops_root_index() {
        let root = Node::new_root("root-1".into());
        let row = NodeRow::from(&root);
        assert!(row.index.is_none());

        let child = Node::new_child("n1".into(), "root-1".into(), None, 3);
        let row = NodeRow::from(&child);
        assert_eq!(row.index, Some(3));
        assert_eq!(row.into_node().index, 3);
    }
}
