//! Storage Layer
//!
//! This module owns the authoritative tree and everything that crosses the
//! storage boundary:
//!
//! - `NodeArena`: id-keyed node records, parent links and ordered children
//! - `ModelEvent`: progress and change notifications
//! - `PersistenceGateway`: load/save of the serialized document
//!
//! # Architecture
//!
//! The arena is a plain in-memory structure mutated synchronously. Persistence
//! is asynchronous and pluggable; the core ships an in-memory gateway and a
//! single-file gateway, and a remote triple store can be added by implementing
//! the trait.

mod error;
pub mod events;
mod node_arena;
pub mod persistence;

pub use error::PersistenceError;
pub use events::{
    ModelEvent, SerializationPerformance, SerializationProgress, SerializationStatus,
};
pub use node_arena::{NodeArena, TreeChange};
pub use persistence::{FileGateway, LoadedData, MemoryGateway, PersistenceGateway};
