//! Graph Mirror - denormalized assertion index over the arena
//!
//! Every live node is mirrored as the set of assertions implied by its current
//! fields and position. Writes are handled remove-then-add per node: the
//! node's subject entry is dropped and regenerated in full, so stale triples
//! from previous field values can never survive an update.
//!
//! Two indexes are kept:
//!
//! - `by_subject`: subject IRI → that subject's assertions
//! - `referenced_by`: object IRI → subjects holding an assertion that points at it
//!
//! The second lets `remove_node_from_graph` clear references *to* a node (a
//! child's parent pointer, for example) without scanning the whole graph.

use crate::db::{NodeArena, TreeChange};
use crate::graph::namespaces::*;
use crate::models::{Assertion, Node, Term};
use crate::operations::{NodeOperationError, TreeOperations};
use chrono::SecondsFormat;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Assertion set mirroring a `NodeArena`
#[derive(Debug, Clone, Default)]
pub struct GraphMirror {
    namespaces: Namespaces,
    by_subject: HashMap<String, BTreeSet<Assertion>>,
    referenced_by: HashMap<String, HashSet<String>>,
    len: usize,
}

impl GraphMirror {
    pub fn new(namespaces: Namespaces) -> Self {
        Self {
            namespaces,
            ..Default::default()
        }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// The assertions implied by a node's current state
    ///
    /// One per populated field: type, title, created, description, parent and
    /// index. The root carries neither parent nor index.
    pub fn assertions_for(&self, node: &Node) -> Vec<Assertion> {
        let subject = self.namespaces.node_iri(&node.id);
        let mut assertions = Vec::with_capacity(6);

        assertions.push(Assertion::new(
            subject.clone(),
            RDF_TYPE,
            Term::iri(format!("{}{}", TS, node.node_type.local_name())),
        ));
        if let Some(title) = &node.title {
            assertions.push(Assertion::new(subject.clone(), DC_TITLE, Term::literal(title.clone())));
        }
        if let Some(created) = &node.created {
            assertions.push(Assertion::new(
                subject.clone(),
                DC_CREATED,
                Term::typed(created.to_rfc3339_opts(SecondsFormat::AutoSi, true), XSD_DATE_TIME),
            ));
        }
        if let Some(description) = &node.description {
            assertions.push(Assertion::new(
                subject.clone(),
                DC_DESCRIPTION,
                Term::literal(description.clone()),
            ));
        }
        if let Some(parent) = &node.parent {
            assertions.push(Assertion::new(
                subject.clone(),
                TS_PARENT,
                Term::iri(self.namespaces.node_iri(parent)),
            ));
        }
        if !node.is_root() {
            assertions.push(Assertion::new(
                subject,
                TS_INDEX,
                Term::typed(node.index.to_string(), XSD_INTEGER),
            ));
        }

        assertions
    }

    /// Insert the assertions for a node
    pub fn add_node_to_graph(&mut self, node: &Node) {
        for assertion in self.assertions_for(node) {
            self.insert(assertion);
        }
    }

    /// Replace every assertion about a node with its current state
    pub fn update_node_in_graph(&mut self, node: &Node) {
        let subject = self.namespaces.node_iri(&node.id);
        self.remove_subject(&subject);
        self.add_node_to_graph(node);
    }

    /// Remove a node as subject and as object
    pub fn remove_node_from_graph(&mut self, node_id: &str) {
        let iri = self.namespaces.node_iri(node_id);
        self.remove_subject(&iri);

        let Some(referrers) = self.referenced_by.remove(&iri) else {
            return;
        };
        for subject in referrers {
            let Some(assertions) = self.by_subject.get_mut(&subject) else {
                continue;
            };
            let before = assertions.len();
            assertions.retain(|a| a.object.as_iri() != Some(iri.as_str()));
            self.len -= before - assertions.len();
            if assertions.is_empty() {
                self.by_subject.remove(&subject);
            }
        }
    }

    /// Bring the mirror up to date after an arena mutation
    pub fn apply_change(&mut self, arena: &NodeArena, change: &TreeChange) {
        for id in &change.removed {
            self.remove_node_from_graph(id);
        }
        for id in &change.updated {
            match arena.get_node(id) {
                Some(node) => self.update_node_in_graph(node),
                None => self.remove_node_from_graph(id),
            }
        }
    }

    /// Discard everything and mirror the whole arena
    pub fn rebuild_from(&mut self, arena: &NodeArena) {
        self.clear();
        for node in arena.nodes().values() {
            self.add_node_to_graph(node);
        }
    }

    /// Wholesale rebuild in chunks, yielding between them
    ///
    /// Returns the number of nodes mirrored.
    pub async fn rebuild_in_chunks(
        &mut self,
        arena: &NodeArena,
        chunk_size: usize,
    ) -> Result<usize, NodeOperationError> {
        self.clear();
        let Some(root_id) = arena.root_id() else {
            return Ok(0);
        };
        let mut fresh = GraphMirror::new(self.namespaces.clone());
        let count = TreeOperations::process_tree_in_chunks(arena.nodes(), root_id, chunk_size, |node| {
            fresh.add_node_to_graph(node)
        })
        .await?;
        *self = fresh;
        tracing::debug!("Mirrored {} nodes as {} assertions", count, self.len);
        Ok(count)
    }

    pub fn clear(&mut self) {
        self.by_subject.clear();
        self.referenced_by.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sorted copy of every assertion, safe to hand to another task
    pub fn snapshot(&self) -> Vec<Assertion> {
        let mut all: Vec<Assertion> = self.by_subject.values().flatten().cloned().collect();
        all.sort();
        all
    }

    /// Assertions whose subject is the given node
    pub fn assertions_about(&self, node_id: &str) -> Vec<&Assertion> {
        self.by_subject
            .get(&self.namespaces.node_iri(node_id))
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Whether any assertion mentions the node as subject or object
    pub fn references(&self, node_id: &str) -> bool {
        let iri = self.namespaces.node_iri(node_id);
        self.by_subject.contains_key(&iri)
            || self
                .referenced_by
                .get(&iri)
                .is_some_and(|referrers| !referrers.is_empty())
    }

    fn insert(&mut self, assertion: Assertion) {
        if let Some(object) = assertion.object.as_iri() {
            self.referenced_by
                .entry(object.to_string())
                .or_default()
                .insert(assertion.subject.clone());
        }
        if self
            .by_subject
            .entry(assertion.subject.clone())
            .or_default()
            .insert(assertion)
        {
            self.len += 1;
        }
    }

    fn remove_subject(&mut self, subject: &str) {
        let Some(assertions) = self.by_subject.remove(subject) else {
            return;
        };
        self.len -= assertions.len();
        for assertion in &assertions {
            let Some(object) = assertion.object.as_iri() else {
                continue;
            };
            if let Some(referrers) = self.referenced_by.get_mut(object) {
                referrers.remove(subject);
                if referrers.is_empty() {
                    self.referenced_by.remove(object);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeUpdate;

    fn sample_arena() -> NodeArena {
        let mut arena = NodeArena::with_root("R");
        arena.add_node_with_id("a".into(), "R", Some("A".into()), None).unwrap();
        arena.add_node_with_id("b".into(), "R", Some("B".into()), None).unwrap();
        arena.add_node_with_id("a1".into(), "a", None, None).unwrap();
        arena
    }

    fn rebuilt(arena: &NodeArena) -> Vec<Assertion> {
        let mut mirror = GraphMirror::default();
        mirror.rebuild_from(arena);
        mirror.snapshot()
    }

    #[test]
    fn test_root_has_no_parent_or_index() {
        let mirror = GraphMirror::default();
        let root = Node::new_root("R".into());
        let assertions = mirror.assertions_for(&root);
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].predicate, RDF_TYPE);
        assert_eq!(assertions[0].object, Term::iri(format!("{}RootNode", TS)));
    }

    #[test]
    fn test_update_drops_stale_values() {
        let mut arena = sample_arena();
        let mut mirror = GraphMirror::default();
        mirror.rebuild_from(&arena);

        let change = arena.update_node("a", NodeUpdate::new().with_title("A2")).unwrap();
        mirror.apply_change(&arena, &change);

        let titles: Vec<_> = mirror
            .assertions_about("a")
            .into_iter()
            .filter(|a| a.predicate == DC_TITLE)
            .map(|a| a.object.value().to_string())
            .collect();
        assert_eq!(titles, vec!["A2"]);
        assert_eq!(mirror.snapshot(), rebuilt(&arena));
    }

    #[test]
    fn test_remove_clears_object_references() {
        let arena = sample_arena();
        let mut mirror = GraphMirror::default();
        mirror.rebuild_from(&arena);
        assert!(mirror.references("a"));

        mirror.remove_node_from_graph("a");
        assert!(!mirror.references("a"));
        // a1's parent pointer went with it
        assert!(mirror
            .assertions_about("a1")
            .iter()
            .all(|a| a.predicate != TS_PARENT));
    }

    #[test]
    fn test_incremental_matches_rebuild_after_moves_and_deletes() {
        let mut arena = sample_arena();
        let mut mirror = GraphMirror::default();
        mirror.rebuild_from(&arena);

        let change = arena.move_node("b", "R", Some(0)).unwrap();
        mirror.apply_change(&arena, &change);
        assert_eq!(mirror.snapshot(), rebuilt(&arena));

        let change = arena.move_node("a1", "b", None).unwrap();
        mirror.apply_change(&arena, &change);
        assert_eq!(mirror.snapshot(), rebuilt(&arena));

        let deletion = arena.delete_node("b").unwrap();
        mirror.apply_change(&arena, &TreeChange::from(&deletion));
        assert_eq!(mirror.snapshot(), rebuilt(&arena));
        assert!(!mirror.references("a1"));
        assert!(!mirror.references("b"));
    }

    #[test]
    fn test_created_uses_xsd_date_time() {
        let mirror = GraphMirror::default();
        let node = Node::new_child("n".into(), "R".into(), None, 0);
        let created = mirror
            .assertions_for(&node)
            .into_iter()
            .find(|a| a.predicate == DC_CREATED)
            .unwrap();
        match created.object {
            Term::Literal { datatype, value, .. } => {
                assert_eq!(datatype.as_deref(), Some(XSD_DATE_TIME));
                assert!(value.ends_with('Z'));
            }
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rebuild_in_chunks_matches_rebuild() {
        let arena = sample_arena();
        let mut mirror = GraphMirror::default();
        let count = mirror.rebuild_in_chunks(&arena, 2).await.unwrap();
        assert_eq!(count, 4);
        assert_eq!(mirror.snapshot(), rebuilt(&arena));

        let mut empty = GraphMirror::default();
        assert_eq!(empty.rebuild_in_chunks(&NodeArena::default(), 2).await.unwrap(), 0);
        assert!(empty.is_empty());
    }
}
