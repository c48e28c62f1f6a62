//! Node Arena - authoritative tree topology
//!
//! The arena owns every node record, keyed by id, and is the single source of
//! truth for parent links, ordered children and position indices. Mutators
//! validate their request completely before touching any state, then return a
//! [`TreeChange`] naming every node whose mirrored facts changed so the graph
//! mirror can be brought up to date in the same synchronous call.
//!
//! # Invariants
//!
//! - at most one node has `parent = None`, and it is the root
//! - `parent.children[n.index] == n.id` for every non-root node
//! - every id in any child list is a key of the arena
//! - the parent relation is acyclic and everything is reachable from the root

use crate::models::{Node, NodeKind, NodeUpdate, ValidationError, NODE_ID_PREFIX, ROOT_ID_PREFIX};
use crate::operations::{NodeMap, NodeOperationError, TreeDeletion, TreeOperations, TreeStructure};
use std::collections::HashSet;

/// Nodes affected by a single mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeChange {
    /// Nodes whose fields, parent or index changed
    pub updated: Vec<String>,
    /// Nodes removed from the arena
    pub removed: Vec<String>,
}

impl TreeChange {
    fn updated(ids: Vec<String>) -> Self {
        Self {
            updated: ids,
            removed: Vec::new(),
        }
    }

    fn push_unique(&mut self, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            if !self.updated.contains(&id) {
                self.updated.push(id);
            }
        }
    }
}

impl From<&TreeDeletion> for TreeChange {
    fn from(deletion: &TreeDeletion) -> Self {
        Self {
            updated: deletion.reindexed_ids.clone(),
            removed: deletion.deleted_ids.clone(),
        }
    }
}

/// Owner of all node records
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: NodeMap,
    root_id: Option<String>,
}

impl NodeArena {
    /// Create an arena holding only a freshly generated root
    pub fn new() -> Self {
        Self::with_root(Node::generate_id(ROOT_ID_PREFIX))
    }

    /// Create an arena holding only a root with the given id
    pub fn with_root(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut nodes = NodeMap::new();
        nodes.insert(root_id.clone(), Node::new_root(root_id.clone()));
        Self {
            nodes,
            root_id: Some(root_id),
        }
    }

    /// Adopt a tree rebuilt by `TreeOperations::build_tree_structure`
    pub fn from_structure(tree: TreeStructure) -> Self {
        Self {
            nodes: tree.nodes,
            root_id: Some(tree.root_id),
        }
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_root_node(&self) -> Option<&Node> {
        self.root_id.as_deref().and_then(|id| self.nodes.get(id))
    }

    pub fn get_all_nodes(&self) -> Vec<&Node> {
        self.nodes.values().collect()
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node with a generated id under `parent_id`
    ///
    /// Appends when `index` is `None`; otherwise inserts at `index` and shifts
    /// later siblings.
    pub fn add_node(
        &mut self,
        parent_id: &str,
        title: Option<String>,
        index: Option<usize>,
    ) -> Result<(Node, TreeChange), NodeOperationError> {
        self.add_node_with_id(Node::generate_id(NODE_ID_PREFIX), parent_id, title, index)
    }

    /// Add a node with a caller-chosen id
    pub fn add_node_with_id(
        &mut self,
        id: String,
        parent_id: &str,
        title: Option<String>,
        index: Option<usize>,
    ) -> Result<(Node, TreeChange), NodeOperationError> {
        if id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        if self.nodes.contains_key(&id) {
            return Err(ValidationError::DuplicateId { node_id: id }.into());
        }
        let sibling_count = self
            .nodes
            .get(parent_id)
            .map(|parent| parent.children.len())
            .ok_or_else(|| NodeOperationError::node_not_found(parent_id))?;
        let position = match index {
            Some(index) if index > sibling_count => {
                return Err(NodeOperationError::index_out_of_range(index, sibling_count))
            }
            Some(index) => index,
            None => sibling_count,
        };

        let node = Node::new_child(id.clone(), parent_id.to_string(), title, position);
        self.nodes.insert(id.clone(), node);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.insert(position, id.clone());
        }

        let mut change = TreeChange::updated(vec![id.clone()]);
        change.push_unique(TreeOperations::reindex_children(
            &mut self.nodes,
            parent_id,
            position,
        ));

        let created = self
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| NodeOperationError::node_not_found(&id))?;
        Ok((created, change))
    }

    /// Merge a partial update into a node; topology is untouched
    pub fn update_node(
        &mut self,
        id: &str,
        update: NodeUpdate,
    ) -> Result<TreeChange, NodeOperationError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| NodeOperationError::node_not_found(id))?;
        node.apply(update);
        Ok(TreeChange::updated(vec![id.to_string()]))
    }

    /// Replace (or clear) a node's description
    pub fn update_description(
        &mut self,
        id: &str,
        description: Option<String>,
    ) -> Result<TreeChange, NodeOperationError> {
        self.update_node(
            id,
            NodeUpdate {
                description: Some(description),
                ..Default::default()
            },
        )
    }

    /// Move a node (with its subtree) under `new_parent_id`
    ///
    /// The node is removed from its old parent's children (re-indexing the
    /// remainder), then inserted at `new_index`, or appended when `None`. The
    /// root cannot be moved, and neither can a node be moved beneath itself.
    pub fn move_node(
        &mut self,
        id: &str,
        new_parent_id: &str,
        new_index: Option<usize>,
    ) -> Result<TreeChange, NodeOperationError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| NodeOperationError::node_not_found(id))?;
        let old_parent_id = match (&node.parent, node.node_type) {
            (Some(parent), NodeKind::Node) => parent.clone(),
            _ => {
                return Err(ValidationError::RootCannotMove {
                    node_id: id.to_string(),
                }
                .into())
            }
        };
        let new_parent = self
            .nodes
            .get(new_parent_id)
            .ok_or_else(|| NodeOperationError::node_not_found(new_parent_id))?;
        if TreeOperations::is_same_or_descendant(&self.nodes, id, new_parent_id) {
            return Err(NodeOperationError::circular_reference(id, new_parent_id));
        }

        let available = if old_parent_id == new_parent_id {
            new_parent.children.len().saturating_sub(1)
        } else {
            new_parent.children.len()
        };
        let position = match new_index {
            Some(index) if index > available => {
                return Err(NodeOperationError::index_out_of_range(index, available))
            }
            Some(index) => index,
            None => available,
        };

        let mut change = TreeChange::updated(vec![id.to_string()]);

        let old_position = self.nodes.get_mut(&old_parent_id).and_then(|parent| {
            let at = parent.children.iter().position(|c| c == id)?;
            parent.children.remove(at);
            Some(at)
        });
        if let Some(old_position) = old_position {
            change.push_unique(TreeOperations::reindex_children(
                &mut self.nodes,
                &old_parent_id,
                old_position,
            ));
        }

        if let Some(parent) = self.nodes.get_mut(new_parent_id) {
            parent.children.insert(position, id.to_string());
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(new_parent_id.to_string());
        }
        change.push_unique(TreeOperations::reindex_children(
            &mut self.nodes,
            new_parent_id,
            position,
        ));

        Ok(change)
    }

    /// Delete a node and every descendant
    ///
    /// Deleting the root empties the arena.
    pub fn delete_node(&mut self, id: &str) -> Result<TreeDeletion, NodeOperationError> {
        let deletion = TreeOperations::delete_node_tree(&mut self.nodes, id, |_| {})?;
        if self.root_id.as_deref() == Some(id) {
            self.root_id = None;
        }
        Ok(deletion)
    }

    /// Check every arena invariant, returning a description of each violation
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let Some(root_id) = self.root_id.as_deref() else {
            if !self.nodes.is_empty() {
                violations.push("arena has nodes but no root".to_string());
            }
            return violations;
        };

        let parentless: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.id.as_str())
            .collect();
        if parentless != [root_id] {
            violations.push(format!("parentless nodes {:?}, expected only root", parentless));
        }

        for node in self.nodes.values() {
            for (position, child_id) in node.children.iter().enumerate() {
                match self.nodes.get(child_id) {
                    None => violations.push(format!("'{}' lists missing child '{}'", node.id, child_id)),
                    Some(child) => {
                        if child.index != position {
                            violations.push(format!(
                                "'{}' has index {} but sits at {} under '{}'",
                                child_id, child.index, position, node.id
                            ));
                        }
                        if child.parent.as_deref() != Some(node.id.as_str()) {
                            violations.push(format!(
                                "'{}' listed under '{}' but points at {:?}",
                                child_id, node.id, child.parent
                            ));
                        }
                    }
                }
            }
        }

        let mut reachable: HashSet<String> =
            TreeOperations::get_all_descendant_ids(&self.nodes, root_id)
                .into_iter()
                .collect();
        reachable.insert(root_id.to_string());
        if reachable.len() != self.nodes.len() {
            violations.push(format!(
                "{} nodes unreachable from root",
                self.nodes.len() - reachable.len()
            ));
        }

        violations
    }
}

#[cfg(test)]
#[path = "node_arena_test.rs"]
mod node_arena_test;
