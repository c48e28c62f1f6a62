//! Trestle Core
//!
//! This crate provides the in-memory model behind the Trestle outline editor:
//! a hierarchy of nodes mirrored, change by change, into a graph of
//! subject–predicate–object assertions that is persisted as Turtle.
//!
//! # Architecture
//!
//! - **Arena as source of truth**: nodes live in an id-keyed map; the tree is
//!   expressed by parent ids and ordered child lists
//! - **Incremental mirror**: every mutation reports the ids it touched, and
//!   only those nodes' assertions are rewritten
//! - **Non-blocking serialization**: large graphs are written in chunks, on a
//!   background worker task when the runtime allows, with a size-scaled timeout
//! - **Pluggable persistence**: load and save go through a gateway trait
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, NodeRow, Assertion)
//! - [`operations`] - Tree algorithms (descendants, subtree delete, rebuild)
//! - [`db`] - Node arena, events and persistence gateways
//! - [`graph`] - Namespaces and the graph mirror
//! - [`serialization`] - Turtle writer, streaming parser and worker pipeline
//! - [`services`] - The `TrestleModel` façade and debounced auto-save
//! - [`config`] - Runtime configuration

pub mod config;
pub mod db;
pub mod graph;
pub mod models;
pub mod operations;
pub mod serialization;
pub mod services;

// Re-export commonly used types
pub use config::{SerializationConfig, SupersededSavePolicy, TrestleConfig, WorkerMode};
pub use db::{
    FileGateway, LoadedData, MemoryGateway, ModelEvent, NodeArena, PersistenceError,
    PersistenceGateway,
};
pub use graph::{GraphMirror, Namespaces};
pub use models::*;
pub use operations::NodeOperationError;
pub use serialization::{PipelineError, SerializeOutcome};
pub use services::*;
