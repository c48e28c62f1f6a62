//! Trestle Model
//!
//! The façade editors talk to. It owns the node arena and its graph mirror,
//! keeps them in lockstep on every mutation, and coordinates load, save and
//! serialization.
//!
//! # Consistency
//!
//! Arena and mirror live behind one lock. Each mutation validates, changes the
//! arena and applies the resulting [`TreeChange`] to the mirror before the
//! lock is released, so no reader ever sees one without the other. The lock is
//! never held across an await: `serialize` copies a snapshot first, and `load`
//! builds a fresh arena and mirror before swapping both in.
//!
//! # Events
//!
//! Every mutation and lifecycle step is broadcast as a [`ModelEvent`].
//! Subscribers that fall behind lose old events; nothing blocks on them.
//!
//! # Auto-save
//!
//! With `auto_save` on, mutations notify a [`ChangeScheduler`] that saves once
//! the model has been quiet for `save_debounce_ms`. The scheduler holds only a
//! weak reference, so dropping the last model handle stops it.

use crate::config::{SupersededSavePolicy, TrestleConfig};
use crate::db::{LoadedData, ModelEvent, NodeArena, PersistenceError, PersistenceGateway, TreeChange};
use crate::graph::{find_root_id, rows_from_assertions, GraphMirror, Namespaces};
use crate::models::{Assertion, Node, NodeUpdate, ValidationError};
use crate::operations::{NodeOperationError, TreeOperations};
use crate::serialization::{JobStatus, SerializationPipeline, SerializeOutcome};
use crate::services::change_scheduler::{ChangeScheduler, SaveTarget};
use crate::services::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::broadcast;

/// Broadcast channel capacity for model events
///
/// Large enough to absorb a burst of edits plus serialization progress.
pub const MODEL_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Mutation counters and current sizes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub nodes_moved: usize,
    pub nodes_deleted: usize,
    pub node_count: usize,
    pub assertion_count: usize,
}

#[derive(Default)]
struct StatCounters {
    added: AtomicUsize,
    updated: AtomicUsize,
    moved: AtomicUsize,
    deleted: AtomicUsize,
}

struct ModelState {
    arena: NodeArena,
    mirror: GraphMirror,
}

struct ModelInner {
    config: TrestleConfig,
    state: RwLock<ModelState>,
    pipeline: SerializationPipeline,
    gateway: Arc<dyn PersistenceGateway>,
    event_tx: broadcast::Sender<ModelEvent>,
    stats: StatCounters,
    scheduler: Option<ChangeScheduler>,
}

/// Saves through a weak handle so the scheduler never keeps the model alive
struct ModelSaveTarget(Weak<ModelInner>);

#[async_trait]
impl SaveTarget for ModelSaveTarget {
    async fn save(&self) -> Result<(), ModelError> {
        match self.0.upgrade() {
            Some(inner) => TrestleModel { inner }.save().await,
            None => Ok(()),
        }
    }
}

/// Hierarchical document model with a synchronized graph view
///
/// Cheap to clone; clones share the same model.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use trestle_core::{MemoryGateway, TrestleConfig, TrestleModel};
///
/// # async fn example() -> Result<(), trestle_core::ModelError> {
/// let model = TrestleModel::new(Arc::new(MemoryGateway::new()), TrestleConfig::default());
/// let root_id = model.create_empty_model();
/// let child = model.add_child(&root_id, Some("Groceries".to_string()))?;
/// model.add_child(&child.id, Some("Milk".to_string()))?;
/// model.save().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TrestleModel {
    inner: Arc<ModelInner>,
}

impl TrestleModel {
    /// Create a model with no nodes
    ///
    /// Call [`initialize`](Self::initialize), [`load`](Self::load) or
    /// [`create_empty_model`](Self::create_empty_model) before editing. The
    /// auto-save scheduler starts only when `config.auto_save` is set and a
    /// tokio runtime is available.
    pub fn new(gateway: Arc<dyn PersistenceGateway>, config: TrestleConfig) -> Self {
        let namespaces = Namespaces::new(config.base_uri.clone());
        let (event_tx, _) = broadcast::channel(MODEL_EVENT_CHANNEL_CAPACITY);
        let pipeline = SerializationPipeline::new(config.serialization.clone(), namespaces.clone())
            .with_events(event_tx.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<ModelInner>| {
            let scheduler = if !config.auto_save {
                None
            } else if tokio::runtime::Handle::try_current().is_err() {
                tracing::warn!("No tokio runtime available, auto-save disabled");
                None
            } else {
                Some(ChangeScheduler::spawn(
                    Arc::new(ModelSaveTarget(weak.clone())),
                    config.save_debounce(),
                ))
            };

            ModelInner {
                state: RwLock::new(ModelState {
                    arena: NodeArena::default(),
                    mirror: GraphMirror::new(namespaces),
                }),
                pipeline,
                gateway,
                event_tx,
                stats: StatCounters::default(),
                scheduler,
                config,
            }
        });

        Self { inner }
    }

    pub fn config(&self) -> &TrestleConfig {
        &self.inner.config
    }

    pub fn namespaces(&self) -> &Namespaces {
        self.inner.pipeline.namespaces()
    }

    /// Subscribe to model events
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<ModelEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Whether mutations schedule a debounced save
    pub fn auto_save_enabled(&self) -> bool {
        self.inner.scheduler.is_some()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Replace the model with a fresh tree holding only a root
    ///
    /// Returns the new root id.
    pub fn create_empty_model(&self) -> String {
        let arena = NodeArena::new();
        let root_id = arena.root_id().unwrap_or_default().to_string();
        self.replace_state(arena);

        tracing::info!("Created empty model with root '{}'", root_id);
        self.emit(ModelEvent::Created {
            root_id: root_id.clone(),
        });
        root_id
    }

    /// Load the model from the gateway
    ///
    /// An empty store produces an empty model. Returns the number of nodes
    /// loaded. On failure the current model is left as it was.
    pub async fn load(&self) -> Result<usize, ModelError> {
        self.emit(ModelEvent::Loading);
        match self.load_from_gateway().await {
            Ok(Some(node_count)) => {
                tracing::info!("Loaded {} nodes", node_count);
                self.emit(ModelEvent::Loaded { node_count });
                Ok(node_count)
            }
            Ok(None) => {
                tracing::info!("Store is empty, starting with an empty model");
                self.create_empty_model();
                self.emit(ModelEvent::Loaded { node_count: 1 });
                Ok(1)
            }
            Err(e) => {
                tracing::error!("Failed to load model: {}", e);
                self.emit(ModelEvent::error(format!("Failed to load: {}", e)));
                Err(e)
            }
        }
    }

    /// Load, falling back to an empty model when loading fails
    pub async fn initialize(&self) -> usize {
        match self.load().await {
            Ok(node_count) => node_count,
            Err(e) => {
                tracing::warn!("Starting with an empty model after load failure: {}", e);
                self.create_empty_model();
                1
            }
        }
    }

    async fn load_from_gateway(&self) -> Result<Option<usize>, ModelError> {
        let rows = match self.inner.gateway.load().await? {
            LoadedData::Rows(rows) => rows,
            LoadedData::Document(text) => {
                let assertions = self.inner.pipeline.deserialize(&text).await?;
                rows_from_assertions(&assertions, self.namespaces())
            }
        };
        if rows.is_empty() {
            return Ok(None);
        }

        let root_id = find_root_id(&rows).ok_or(NodeOperationError::MissingRoot)?;
        let tree = TreeOperations::build_tree_structure(rows, &root_id)?;
        let arena = NodeArena::from_structure(tree);

        let mut mirror = GraphMirror::new(self.namespaces().clone());
        mirror
            .rebuild_in_chunks(&arena, self.inner.config.rebuild_chunk_size)
            .await?;

        let node_count = arena.len();
        *self.write_state() = ModelState { arena, mirror };
        Ok(Some(node_count))
    }

    /// Serialize the current graph to Turtle
    ///
    /// Returns [`SerializeOutcome::InProgress`] when another serialization is
    /// already running.
    pub async fn serialize(&self) -> Result<SerializeOutcome, ModelError> {
        let snapshot = self.read_state().mirror.snapshot();
        match self.inner.pipeline.serialize(snapshot).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.emit(ModelEvent::error(format!("Serialization failed: {}", e)));
                Err(e.into())
            }
        }
    }

    /// Current state of the serialization job slot
    pub fn serialization_status(&self) -> JobStatus {
        self.inner.pipeline.status()
    }

    /// Serialize and write the model through the gateway
    ///
    /// The gateway call is raced against `save_timeout_ms`. On timeout the
    /// call is detached or aborted according to `superseded_save_policy`.
    pub async fn save(&self) -> Result<(), ModelError> {
        self.emit(ModelEvent::Saving);

        let graph = match self.serialize().await? {
            SerializeOutcome::Completed(graph) => graph,
            SerializeOutcome::InProgress(status) => {
                tracing::debug!("Save skipped, serialization already running");
                return Err(ModelError::SerializationInProgress(status));
            }
        };

        let gateway = Arc::clone(&self.inner.gateway);
        let timeout = self.inner.config.save_timeout();
        let mut task = tokio::spawn(async move { gateway.save(graph.text).await });

        let settled = tokio::select! {
            joined = &mut task => Some(joined),
            _ = tokio::time::sleep(timeout) => None,
        };

        let result: Result<(), ModelError> = match settled {
            Some(Ok(result)) => result.map_err(Into::into),
            Some(Err(e)) => Err(PersistenceError::task(e.to_string()).into()),
            None => {
                match self.inner.config.superseded_save_policy {
                    SupersededSavePolicy::Abort => {
                        task.abort();
                        tracing::warn!("Save exceeded {}ms and was aborted", timeout.as_millis());
                    }
                    SupersededSavePolicy::Detach => {
                        tracing::warn!(
                            "Save exceeded {}ms; the write continues in the background",
                            timeout.as_millis()
                        );
                    }
                }
                Err(PersistenceError::timed_out(timeout).into())
            }
        };

        match &result {
            Ok(()) => {
                tracing::debug!("Model saved");
                self.emit(ModelEvent::Saved);
            }
            Err(e) => {
                tracing::error!("Failed to save model: {}", e);
                self.emit(ModelEvent::error(format!("Failed to save: {}", e)));
            }
        }
        result
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a node under `parent_id`, appending when `index` is `None`
    pub fn add_node(
        &self,
        parent_id: &str,
        title: Option<String>,
        index: Option<usize>,
    ) -> Result<Node, ModelError> {
        let node = self.mutate(|arena| arena.add_node(parent_id, title, index))?;
        self.record_added(&node);
        Ok(node)
    }

    /// Add a node with a caller-chosen id
    pub fn add_node_with_id(
        &self,
        id: impl Into<String>,
        parent_id: &str,
        title: Option<String>,
        index: Option<usize>,
    ) -> Result<Node, ModelError> {
        let id = id.into();
        let node = self.mutate(|arena| arena.add_node_with_id(id, parent_id, title, index))?;
        self.record_added(&node);
        Ok(node)
    }

    /// Append a child to `parent_id`
    pub fn add_child(&self, parent_id: &str, title: Option<String>) -> Result<Node, ModelError> {
        self.add_node(parent_id, title, None)
    }

    /// Insert a node directly after `sibling_id` under the same parent
    pub fn add_sibling(&self, sibling_id: &str, title: Option<String>) -> Result<Node, ModelError> {
        let node = self.mutate(|arena| {
            let sibling = arena
                .get_node(sibling_id)
                .ok_or_else(|| NodeOperationError::node_not_found(sibling_id))?;
            let parent_id = sibling.parent.clone().ok_or_else(|| ValidationError::RootHasNoSiblings {
                node_id: sibling_id.to_string(),
            })?;
            let index = sibling.index + 1;
            arena.add_node(&parent_id, title, Some(index))
        })?;
        self.record_added(&node);
        Ok(node)
    }

    /// Apply a partial update to a node's payload
    pub fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node, ModelError> {
        let node = self.mutate(|arena| {
            let change = arena.update_node(id, update)?;
            Ok((arena.get_node(id).cloned(), change))
        })?;
        self.record_updated(id);
        node.ok_or_else(|| NodeOperationError::node_not_found(id).into())
    }

    /// Replace or clear a node's description
    pub fn update_description(&self, id: &str, description: Option<String>) -> Result<(), ModelError> {
        self.mutate(|arena| Ok(((), arena.update_description(id, description)?)))?;
        self.record_updated(id);
        Ok(())
    }

    /// Move a node and its subtree under `new_parent_id`
    pub fn move_node(
        &self,
        id: &str,
        new_parent_id: &str,
        new_index: Option<usize>,
    ) -> Result<(), ModelError> {
        self.mutate(|arena| Ok(((), arena.move_node(id, new_parent_id, new_index)?)))?;
        self.record_moved(id, new_parent_id);
        Ok(())
    }

    /// Make a node the last child of its previous sibling
    ///
    /// Returns `false` without changing anything when there is no previous
    /// sibling (or the node is the root).
    pub fn indent_node(&self, id: &str) -> Result<bool, ModelError> {
        let new_parent = self.mutate(|arena| {
            let node = arena
                .get_node(id)
                .ok_or_else(|| NodeOperationError::node_not_found(id))?;
            let previous = match (&node.parent, node.index) {
                (Some(parent_id), index) if index > 0 => arena
                    .get_node(parent_id)
                    .and_then(|parent| parent.children.get(index - 1))
                    .cloned(),
                _ => None,
            };
            match previous {
                Some(previous) => {
                    let change = arena.move_node(id, &previous, None)?;
                    Ok((Some(previous), change))
                }
                None => Ok((None, TreeChange::default())),
            }
        })?;

        match new_parent {
            Some(parent_id) => {
                self.record_moved(id, &parent_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move a node to just after its parent, under its grandparent
    ///
    /// Returns `false` without changing anything when the node is the root or
    /// a direct child of the root.
    pub fn outdent_node(&self, id: &str) -> Result<bool, ModelError> {
        let new_parent = self.mutate(|arena| {
            let node = arena
                .get_node(id)
                .ok_or_else(|| NodeOperationError::node_not_found(id))?;
            let target = node
                .parent
                .as_deref()
                .and_then(|parent_id| arena.get_node(parent_id))
                .and_then(|parent| parent.parent.clone().map(|grandparent| (grandparent, parent.index + 1)));
            match target {
                Some((grandparent, index)) => {
                    let change = arena.move_node(id, &grandparent, Some(index))?;
                    Ok((Some(grandparent), change))
                }
                None => Ok((None, TreeChange::default())),
            }
        })?;

        match new_parent {
            Some(parent_id) => {
                self.record_moved(id, &parent_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete a node and its whole subtree
    ///
    /// Returns the deleted ids, the target first. Deleting the root empties
    /// the model.
    pub fn delete_node(&self, id: &str) -> Result<Vec<String>, ModelError> {
        let deleted_ids = self.mutate(|arena| {
            let deletion = arena.delete_node(id)?;
            let change = TreeChange::from(&deletion);
            Ok((deletion.deleted_ids, change))
        })?;

        self.inner
            .stats
            .deleted
            .fetch_add(deleted_ids.len(), Ordering::Relaxed);
        tracing::debug!("Deleted '{}' and {} descendants", id, deleted_ids.len() - 1);
        self.emit(ModelEvent::NodeDeleted {
            node_id: id.to_string(),
            deleted_ids: deleted_ids.clone(),
        });
        self.schedule_save();
        Ok(deleted_ids)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn root_id(&self) -> Option<String> {
        self.read_state().arena.root_id().map(str::to_string)
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.read_state().arena.get_node(id).cloned()
    }

    pub fn get_root_node(&self) -> Option<Node> {
        self.read_state().arena.get_root_node().cloned()
    }

    pub fn get_all_nodes(&self) -> Vec<Node> {
        self.read_state()
            .arena
            .get_all_nodes()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Children of `id` in document order
    pub fn get_children(&self, id: &str) -> Result<Vec<Node>, ModelError> {
        let state = self.read_state();
        let node = state
            .arena
            .get_node(id)
            .ok_or_else(|| NodeOperationError::node_not_found(id))?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| state.arena.get_node(child).cloned())
            .collect())
    }

    pub fn node_count(&self) -> usize {
        self.read_state().arena.len()
    }

    /// Sorted copy of every assertion in the graph mirror
    pub fn assertions(&self) -> Vec<Assertion> {
        self.read_state().mirror.snapshot()
    }

    pub fn assertion_count(&self) -> usize {
        self.read_state().mirror.len()
    }

    pub fn stats(&self) -> ModelStats {
        let state = self.read_state();
        let counters = &self.inner.stats;
        ModelStats {
            nodes_added: counters.added.load(Ordering::Relaxed),
            nodes_updated: counters.updated.load(Ordering::Relaxed),
            nodes_moved: counters.moved.load(Ordering::Relaxed),
            nodes_deleted: counters.deleted.load(Ordering::Relaxed),
            node_count: state.arena.len(),
            assertion_count: state.mirror.len(),
        }
    }

    /// Check the arena invariants and that the mirror matches the arena
    ///
    /// Returns a description of each problem found; empty means consistent.
    pub fn verify(&self) -> Vec<String> {
        let state = self.read_state();
        let mut problems = state.arena.verify_integrity();

        let mut expected = GraphMirror::new(self.namespaces().clone());
        expected.rebuild_from(&state.arena);
        if expected.snapshot() != state.mirror.snapshot() {
            problems.push(format!(
                "graph mirror holds {} assertions, arena implies {}",
                state.mirror.len(),
                expected.len()
            ));
        }
        problems
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Run one arena mutation and apply its change to the mirror under one lock
    fn mutate<T, F>(&self, op: F) -> Result<T, ModelError>
    where
        F: FnOnce(&mut NodeArena) -> Result<(T, TreeChange), NodeOperationError>,
    {
        let mut guard = self.write_state();
        let state = &mut *guard;
        let (value, change) = op(&mut state.arena)?;
        state.mirror.apply_change(&state.arena, &change);
        Ok(value)
    }

    fn replace_state(&self, arena: NodeArena) {
        let mut mirror = GraphMirror::new(self.namespaces().clone());
        mirror.rebuild_from(&arena);
        *self.write_state() = ModelState { arena, mirror };
    }

    fn record_added(&self, node: &Node) {
        self.inner.stats.added.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Added node '{}'", node.id);
        self.emit(ModelEvent::NodeAdded {
            node_id: node.id.clone(),
            parent_id: node.parent.clone().unwrap_or_default(),
        });
        self.schedule_save();
    }

    fn record_updated(&self, id: &str) {
        self.inner.stats.updated.fetch_add(1, Ordering::Relaxed);
        self.emit(ModelEvent::NodeUpdated {
            node_id: id.to_string(),
        });
        self.schedule_save();
    }

    fn record_moved(&self, id: &str, new_parent_id: &str) {
        self.inner.stats.moved.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Moved node '{}' under '{}'", id, new_parent_id);
        self.emit(ModelEvent::NodeMoved {
            node_id: id.to_string(),
            new_parent_id: new_parent_id.to_string(),
        });
        self.schedule_save();
    }

    fn schedule_save(&self) {
        if let Some(scheduler) = &self.inner.scheduler {
            scheduler.notifier().notify();
        }
    }

    fn emit(&self, event: ModelEvent) {
        // No subscribers is fine
        let _ = self.inner.event_tx.send(event);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ModelState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ModelState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "trestle_model_test.rs"]
mod trestle_model_test;
