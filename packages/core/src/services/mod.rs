//! Model Services
//!
//! This module contains the coordination layer on top of the arena, mirror
//! and serialization pipeline:
//!
//! - `TrestleModel` - Mutations, queries, load/save and event broadcast
//! - `ChangeScheduler` - Debounced background auto-save
//!
//! Services own the locking and lifecycle rules; the layers below them are
//! plain data structures and stateless operations.

pub mod change_scheduler;
pub mod error;
pub mod trestle_model;

pub use change_scheduler::{ChangeNotifier, ChangeScheduler, SaveTarget};
pub use error::ModelError;
pub use trestle_model::{ModelStats, TrestleModel, MODEL_EVENT_CHANNEL_CAPACITY};
