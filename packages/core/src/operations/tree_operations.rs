//! Iterative tree algorithms over an id-keyed node map
//!
//! Nothing in this module recurses: traversal and deletion use an explicit
//! worklist so stack usage is independent of tree depth. A single-branch tree
//! a hundred thousand levels deep is handled the same way as a flat one.
//!
//! The functions operate on a bare [`NodeMap`] rather than on the arena so the
//! arena, the loader and the graph mirror can all share them.

use crate::models::{Node, NodeKind, NodeRow, ValidationError};
use crate::operations::NodeOperationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Id-keyed storage for every node in a tree
pub type NodeMap = HashMap<String, Node>;

/// Default number of nodes visited per chunk in [`TreeOperations::process_tree_in_chunks`]
pub const DEFAULT_TREE_CHUNK_SIZE: usize = 100;

/// Tree rebuilt from flat rows
#[derive(Debug, Clone)]
pub struct TreeStructure {
    pub root_id: String,
    pub nodes: NodeMap,
}

/// Outcome of [`TreeOperations::delete_node_tree`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDeletion {
    /// The deleted node followed by all of its descendants
    pub deleted_ids: Vec<String>,
    /// Former parent of the deleted node (None when the root was deleted)
    pub parent_id: Option<String>,
    /// Surviving siblings whose `index` shifted
    pub reindexed_ids: Vec<String>,
}

/// Progress report emitted after every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub processed: usize,
    pub total: usize,
    pub percentage: u8,
}

impl ChunkProgress {
    fn new(processed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((processed * 100) / total).min(100) as u8
        };
        Self {
            processed,
            total,
            percentage,
        }
    }
}

/// Namespace for tree algorithms
pub struct TreeOperations;

impl TreeOperations {
    /// Collect every descendant id of `node_id` (excluding the node itself)
    ///
    /// Uses an explicit stack. Returns an empty list when the node is absent or a leaf.
    /// Every node appears before any of its own descendants, so iterating the
    /// result backwards visits children before parents.
    pub fn get_all_descendant_ids(nodes: &NodeMap, node_id: &str) -> Vec<String> {
        let mut descendant_ids = Vec::new();
        let Some(node) = nodes.get(node_id) else {
            return descendant_ids;
        };

        let mut stack: Vec<&str> = node.children.iter().map(String::as_str).collect();
        while let Some(current_id) = stack.pop() {
            descendant_ids.push(current_id.to_string());
            if let Some(current) = nodes.get(current_id) {
                stack.extend(current.children.iter().map(String::as_str));
            }
        }

        descendant_ids
    }

    /// True when `candidate` is `ancestor` itself or lies somewhere below it
    ///
    /// Walks the parent chain upwards from `candidate`. The walk is bounded by
    /// the map size so a corrupt cyclic chain cannot loop forever.
    pub fn is_same_or_descendant(nodes: &NodeMap, ancestor: &str, candidate: &str) -> bool {
        let mut current = Some(candidate);
        let mut steps = 0usize;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > nodes.len() {
                return false;
            }
            current = nodes.get(id).and_then(|n| n.parent.as_deref());
        }
        false
    }

    /// Delete a node and its whole subtree
    ///
    /// Descendants are removed bottom-up (children before parents) and
    /// `on_remove` is called for each removed id, the target node last. The
    /// node is then detached from its parent and the remaining siblings are
    /// re-indexed.
    pub fn delete_node_tree<F>(
        nodes: &mut NodeMap,
        node_id: &str,
        mut on_remove: F,
    ) -> Result<TreeDeletion, NodeOperationError>
    where
        F: FnMut(&str),
    {
        let parent_id = match nodes.get(node_id) {
            Some(node) => node.parent.clone(),
            None => return Err(NodeOperationError::node_not_found(node_id)),
        };

        let descendant_ids = Self::get_all_descendant_ids(nodes, node_id);
        for id in descendant_ids.iter().rev() {
            on_remove(id);
            nodes.remove(id);
        }

        let mut reindexed_ids = Vec::new();
        if let Some(parent_id) = parent_id.as_deref() {
            let position = nodes
                .get_mut(parent_id)
                .and_then(|parent| {
                    let position = parent.children.iter().position(|c| c == node_id)?;
                    parent.children.remove(position);
                    Some(position)
                });
            if let Some(position) = position {
                reindexed_ids = Self::reindex_children(nodes, parent_id, position);
            }
        }

        on_remove(node_id);
        nodes.remove(node_id);

        let mut deleted_ids = Vec::with_capacity(descendant_ids.len() + 1);
        deleted_ids.push(node_id.to_string());
        deleted_ids.extend(descendant_ids);

        Ok(TreeDeletion {
            deleted_ids,
            parent_id,
            reindexed_ids,
        })
    }

    /// Rewrite `index` for children of `parent_id` from position `from` onwards
    ///
    /// Returns the ids whose stored index actually changed.
    pub fn reindex_children(nodes: &mut NodeMap, parent_id: &str, from: usize) -> Vec<String> {
        let children: Vec<String> = match nodes.get(parent_id) {
            Some(parent) => parent.children.iter().skip(from).cloned().collect(),
            None => return Vec::new(),
        };

        let mut changed = Vec::new();
        for (offset, child_id) in children.into_iter().enumerate() {
            let position = from + offset;
            if let Some(child) = nodes.get_mut(&child_id) {
                if child.index != position {
                    child.index = position;
                    changed.push(child_id);
                }
            }
        }
        changed
    }

    /// Run `callback` over `items` in batches, yielding to the scheduler after each batch
    ///
    /// `on_progress` is invoked once per batch with cumulative counts.
    pub async fn process_in_chunks<T, F, P>(
        items: &[T],
        chunk_size: usize,
        mut callback: F,
        mut on_progress: P,
    ) -> Result<(), NodeOperationError>
    where
        F: FnMut(&T, usize),
        P: FnMut(ChunkProgress),
    {
        if chunk_size == 0 {
            return Err(ValidationError::ZeroChunkSize.into());
        }

        let mut processed = 0;
        for chunk in items.chunks(chunk_size) {
            for item in chunk {
                callback(item, processed);
                processed += 1;
            }
            on_progress(ChunkProgress::new(processed, items.len()));
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    /// Visit `root_id` and all of its descendants in batches of `chunk_size`
    ///
    /// Control returns to the scheduler between batches, so a large tree never
    /// blocks the caller for longer than one batch. Returns the number of
    /// nodes visited.
    pub async fn process_tree_in_chunks<F>(
        nodes: &NodeMap,
        root_id: &str,
        chunk_size: usize,
        mut visit: F,
    ) -> Result<usize, NodeOperationError>
    where
        F: FnMut(&Node),
    {
        if !nodes.contains_key(root_id) {
            return Err(NodeOperationError::node_not_found(root_id));
        }

        let mut all_ids = Vec::with_capacity(nodes.len());
        all_ids.push(root_id.to_string());
        all_ids.extend(Self::get_all_descendant_ids(nodes, root_id));

        let mut visited = 0;
        Self::process_in_chunks(
            &all_ids,
            chunk_size,
            |id, _| {
                if let Some(node) = nodes.get(id) {
                    visit(node);
                    visited += 1;
                }
            },
            |progress| {
                tracing::trace!(
                    "Tree traversal {}/{} ({}%)",
                    progress.processed,
                    progress.total,
                    progress.percentage
                );
            },
        )
        .await?;

        Ok(visited)
    }

    /// Reconstruct a tree from flat rows
    ///
    /// Three passes: (1) map rows by id, (2) link each node into its parent's
    /// child list, (3) sort every child list by the stored `index`. After the
    /// passes the tree is normalized so the arena invariants hold even for
    /// imperfect input:
    ///
    /// - rows whose parent is missing, or that are trapped in a parent cycle,
    ///   are re-attached as trailing children of the root
    /// - extra root rows are demoted to ordinary nodes
    /// - indices are rewritten to match positions (gaps and duplicates removed)
    pub fn build_tree_structure(
        rows: Vec<NodeRow>,
        root_id: &str,
    ) -> Result<TreeStructure, NodeOperationError> {
        // Pass 1: map by id
        let mut nodes: NodeMap = HashMap::with_capacity(rows.len());
        for row in rows {
            let node = row.into_node();
            nodes.insert(node.id.clone(), node);
        }

        match nodes.get_mut(root_id) {
            Some(root) => {
                root.node_type = NodeKind::Root;
                root.parent = None;
                root.index = 0;
            }
            None => return Err(NodeOperationError::MissingRoot),
        }

        let mut ids: Vec<String> = nodes.keys().filter(|id| *id != root_id).cloned().collect();
        ids.sort();

        // Pass 2: link children by parent reference
        let mut links: Vec<(String, String)> = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(node) = nodes.get_mut(id) else {
                continue;
            };
            if node.node_type == NodeKind::Root {
                tracing::warn!("Demoting extra root node '{}' to an ordinary node", id);
                node.node_type = NodeKind::Node;
            }
            let parent = node
                .parent
                .clone()
                .filter(|p| p != id && (p == root_id || ids.binary_search(p).is_ok()));
            let parent = match parent {
                Some(parent) => parent,
                None => {
                    tracing::warn!(
                        "Node '{}' references missing parent {:?}; attaching to root",
                        id,
                        node.parent
                    );
                    node.parent = Some(root_id.to_string());
                    root_id.to_string()
                }
            };
            links.push((parent, id.clone()));
        }
        for (parent_id, child_id) in links {
            if let Some(parent) = nodes.get_mut(&parent_id) {
                parent.children.push(child_id);
            }
        }

        // Pass 3: sort each parent's children by index (id breaks ties)
        let positions: HashMap<String, usize> =
            nodes.values().map(|n| (n.id.clone(), n.index)).collect();
        for node in nodes.values_mut() {
            if node.children.len() > 1 {
                node.children.sort_by(|a, b| {
                    let ia = positions.get(a).copied().unwrap_or(0);
                    let ib = positions.get(b).copied().unwrap_or(0);
                    ia.cmp(&ib).then_with(|| a.cmp(b))
                });
            }
        }

        Self::attach_unreachable(&mut nodes, root_id, &ids);

        let mut corrected = 0usize;
        let parents: Vec<String> = nodes.keys().cloned().collect();
        for parent_id in parents {
            corrected += Self::reindex_children(&mut nodes, &parent_id, 0).len();
        }
        if corrected > 0 {
            tracing::debug!("Normalized {} child indices while building tree", corrected);
        }

        Ok(TreeStructure {
            root_id: root_id.to_string(),
            nodes,
        })
    }

    /// Re-attach nodes that cannot be reached from the root (parent cycles)
    fn attach_unreachable(nodes: &mut NodeMap, root_id: &str, sorted_ids: &[String]) {
        let mut reachable: HashSet<String> = HashSet::with_capacity(nodes.len());
        reachable.insert(root_id.to_string());
        reachable.extend(Self::get_all_descendant_ids(nodes, root_id));
        if reachable.len() == nodes.len() {
            return;
        }

        for id in sorted_ids {
            if reachable.contains(id) {
                continue;
            }
            tracing::warn!("Node '{}' is part of a parent cycle; attaching to root", id);

            let old_parent = nodes.get(id).and_then(|n| n.parent.clone());
            if let Some(old_parent) = old_parent {
                if let Some(parent) = nodes.get_mut(&old_parent) {
                    parent.children.retain(|c| c != id);
                }
            }
            if let Some(node) = nodes.get_mut(id) {
                node.parent = Some(root_id.to_string());
            }
            if let Some(root) = nodes.get_mut(root_id) {
                root.children.push(id.clone());
            }

            reachable.insert(id.clone());
            for descendant in Self::get_all_descendant_ids(nodes, id) {
                reachable.insert(descendant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(depth: usize) -> NodeMap {
        let mut nodes = NodeMap::new();
        nodes.insert("root".into(), Node::new_root("root".into()));
        let mut parent = "root".to_string();
        for i in 0..depth {
            let id = format!("n{}", i);
            nodes.insert(id.clone(), Node::new_child(id.clone(), parent.clone(), None, 0));
            if let Some(p) = nodes.get_mut(&parent) {
                p.children.push(id.clone());
            }
            parent = id;
        }
        nodes
    }

    fn row(id: &str, parent: Option<&str>, index: Option<usize>) -> NodeRow {
        let mut row = NodeRow::new(id, NodeKind::Node);
        row.parent = parent.map(str::to_string);
        row.index = index;
        row
    }

    #[test]
    fn test_descendants_of_leaf_and_missing_are_empty() {
        let nodes = chain(2);
        assert!(TreeOperations::get_all_descendant_ids(&nodes, "n1").is_empty());
        assert!(TreeOperations::get_all_descendant_ids(&nodes, "nope").is_empty());
        assert_eq!(
            TreeOperations::get_all_descendant_ids(&nodes, "root"),
            vec!["n0".to_string(), "n1".to_string()]
        );
    }

    #[test]
    fn test_deep_chain_descendants_and_delete() {
        let depth = 100_000;
        let mut nodes = chain(depth);
        assert_eq!(
            TreeOperations::get_all_descendant_ids(&nodes, "root").len(),
            depth
        );

        let mut removed = 0usize;
        let deletion = TreeOperations::delete_node_tree(&mut nodes, "n0", |_| removed += 1).unwrap();
        assert_eq!(deletion.deleted_ids.len(), depth);
        assert_eq!(removed, depth);
        assert_eq!(nodes.len(), 1);
        assert!(nodes["root"].children.is_empty());
    }

    #[test]
    fn test_delete_removes_children_before_parents() {
        let mut nodes = chain(3);
        let mut order = Vec::new();
        TreeOperations::delete_node_tree(&mut nodes, "n0", |id| order.push(id.to_string()))
            .unwrap();
        assert_eq!(order, vec!["n2", "n1", "n0"]);
    }

    #[test]
    fn test_delete_reindexes_siblings() {
        let mut nodes = NodeMap::new();
        let mut root = Node::new_root("r".into());
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            nodes.insert(id.to_string(), Node::new_child(id.to_string(), "r".into(), None, i));
            root.children.push(id.to_string());
        }
        nodes.insert("r".into(), root);

        let deletion = TreeOperations::delete_node_tree(&mut nodes, "a", |_| {}).unwrap();
        assert_eq!(deletion.parent_id.as_deref(), Some("r"));
        assert_eq!(deletion.reindexed_ids, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(nodes["b"].index, 0);
        assert_eq!(nodes["c"].index, 1);
    }

    #[test]
    fn test_delete_missing_node_is_not_found() {
        let mut nodes = chain(1);
        let err = TreeOperations::delete_node_tree(&mut nodes, "ghost", |_| {}).unwrap_err();
        assert_eq!(err, NodeOperationError::node_not_found("ghost"));
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_is_same_or_descendant() {
        let nodes = chain(3);
        assert!(TreeOperations::is_same_or_descendant(&nodes, "n0", "n2"));
        assert!(TreeOperations::is_same_or_descendant(&nodes, "n0", "n0"));
        assert!(!TreeOperations::is_same_or_descendant(&nodes, "n2", "n0"));
    }

    #[tokio::test]
    async fn test_process_tree_in_chunks_visits_everything() {
        let nodes = chain(250);
        let mut seen = Vec::new();
        let visited = TreeOperations::process_tree_in_chunks(&nodes, "root", 100, |n| {
            seen.push(n.id.clone())
        })
        .await
        .unwrap();
        assert_eq!(visited, 251);
        assert_eq!(seen[0], "root");
    }

    #[tokio::test]
    async fn test_process_in_chunks_reports_progress() {
        let items: Vec<u32> = (0..25).collect();
        let mut sum = 0;
        let mut reports = Vec::new();
        TreeOperations::process_in_chunks(&items, 10, |v, _| sum += v, |p| reports.push(p))
            .await
            .unwrap();
        assert_eq!(sum, (0..25).sum::<u32>());
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2], ChunkProgress::new(25, 25));
        assert_eq!(reports[0].percentage, 40);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let nodes = chain(1);
        let err = tokio_test::block_on(TreeOperations::process_tree_in_chunks(&nodes, "root", 0, |_| {}))
            .unwrap_err();
        assert_eq!(err, NodeOperationError::Validation(ValidationError::ZeroChunkSize));

        let items = [1, 2, 3];
        let err = tokio_test::block_on(TreeOperations::process_in_chunks(&items, 0, |_, _| {}, |_| {}))
            .unwrap_err();
        assert_eq!(err, NodeOperationError::Validation(ValidationError::ZeroChunkSize));
    }

    #[test]
    fn test_build_tree_structure_sorts_by_index() {
        let rows = vec![
            NodeRow::new("r", NodeKind::Root),
            row("c", Some("r"), Some(2)),
            row("a", Some("r"), Some(0)),
            row("b", Some("r"), Some(1)),
            row("a1", Some("a"), Some(0)),
        ];
        let tree = TreeOperations::build_tree_structure(rows, "r").unwrap();
        assert_eq!(tree.nodes["r"].children, vec!["a", "b", "c"]);
        assert_eq!(tree.nodes["a"].children, vec!["a1"]);
    }

    #[test]
    fn test_build_tree_structure_normalizes_gaps() {
        let rows = vec![
            NodeRow::new("r", NodeKind::Root),
            row("x", Some("r"), Some(7)),
            row("y", Some("r"), Some(3)),
        ];
        let tree = TreeOperations::build_tree_structure(rows, "r").unwrap();
        assert_eq!(tree.nodes["r"].children, vec!["y", "x"]);
        assert_eq!(tree.nodes["y"].index, 0);
        assert_eq!(tree.nodes["x"].index, 1);
    }

    #[test]
    fn test_build_tree_structure_attaches_orphans_and_cycles() {
        let rows = vec![
            NodeRow::new("r", NodeKind::Root),
            row("orphan", Some("gone"), Some(0)),
            row("p", Some("q"), Some(0)),
            row("q", Some("p"), Some(0)),
        ];
        let tree = TreeOperations::build_tree_structure(rows, "r").unwrap();
        let all = TreeOperations::get_all_descendant_ids(&tree.nodes, "r");
        assert_eq!(all.len(), 3);
        assert_eq!(tree.nodes["orphan"].parent.as_deref(), Some("r"));
        // p is re-attached first (sorted), q stays beneath it
        assert_eq!(tree.nodes["q"].parent.as_deref(), Some("p"));
        assert!(tree.nodes["q"].children.is_empty());
    }

    #[test]
    fn test_build_tree_structure_requires_root() {
        let rows = vec![row("a", None, None)];
        let err = TreeOperations::build_tree_structure(rows, "r").unwrap_err();
        assert_eq!(err, NodeOperationError::MissingRoot);
    }
}
