//! Model Events
//!
//! Progress and change notifications emitted by the model for an external
//! notification collaborator. The core only emits these; rendering them is
//! someone else's job.
//!
//! # Architecture
//!
//! Events are published on a tokio broadcast channel, so any number of
//! subscribers can observe them. A send with no subscribers is not an error.
//!
//! # Event Flow
//!
//! 1. A model operation (load, save, serialize, mutation) changes state
//! 2. A `ModelEvent` is emitted via the broadcast channel
//! 3. Subscribers receive it asynchronously, e.g. to show a toast or a progress bar

use serde::{Deserialize, Serialize};

/// Phase reported by an in-flight serialization or parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SerializationStatus {
    Started,
    Parsing,
    Serializing,
    Completed,
}

/// Progress snapshot for a serialization or parse job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializationProgress {
    pub status: SerializationStatus,
    pub message: String,
    /// Percentage in `0..=100`
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    pub quad_count: usize,
}

impl SerializationProgress {
    pub fn new(status: SerializationStatus, message: impl Into<String>, progress: u8, quad_count: usize) -> Self {
        Self {
            status,
            message: message.into(),
            progress: progress.min(100),
            current_chunk: None,
            total_chunks: None,
            quad_count,
        }
    }

    pub fn with_chunks(mut self, current_chunk: usize, total_chunks: usize) -> Self {
        self.current_chunk = Some(current_chunk);
        self.total_chunks = Some(total_chunks);
        self
    }
}

/// Timing summary emitted when a serialization settles successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializationPerformance {
    pub quad_count: usize,
    /// Wall time for the whole job
    pub time_ms: u64,
    pub parsing_time_ms: u64,
    pub serializing_time_ms: u64,
    pub quads_per_second: f64,
}

impl SerializationPerformance {
    pub fn new(quad_count: usize, time_ms: u64, parsing_time_ms: u64, serializing_time_ms: u64) -> Self {
        // Sub-millisecond jobs count as one millisecond
        let quads_per_second = quad_count as f64 * 1000.0 / time_ms.max(1) as f64;
        Self {
            quad_count,
            time_ms,
            parsing_time_ms,
            serializing_time_ms,
            quads_per_second,
        }
    }
}

/// Events emitted by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ModelEvent {
    /// A fresh empty model (root only) was created
    Created { root_id: String },

    /// Load from the persistence gateway started
    Loading,

    /// Load finished and the tree was rebuilt
    Loaded { node_count: usize },

    /// Save started
    Saving,

    /// Save acknowledged by the persistence gateway
    Saved,

    /// Serialization or parse progress
    Serializing(SerializationProgress),

    /// Serialization finished
    Serialized { performance: SerializationPerformance },

    /// Any failure surfaced to the user
    Error { message: String },

    NodeAdded { node_id: String, parent_id: String },

    NodeUpdated { node_id: String },

    NodeMoved { node_id: String, new_parent_id: String },

    NodeDeleted { node_id: String, deleted_ids: Vec<String> },
}

impl ModelEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            ModelEvent::Created { .. } => "model:created",
            ModelEvent::Loading => "model:loading",
            ModelEvent::Loaded { .. } => "model:loaded",
            ModelEvent::Saving => "model:saving",
            ModelEvent::Saved => "model:saved",
            ModelEvent::Serializing(_) => "model:serializing",
            ModelEvent::Serialized { .. } => "model:serialized",
            ModelEvent::Error { .. } => "model:error",
            ModelEvent::NodeAdded { .. } => "node:added",
            ModelEvent::NodeUpdated { .. } => "node:updated",
            ModelEvent::NodeMoved { .. } => "node:moved",
            ModelEvent::NodeDeleted { .. } => "node:deleted",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ModelEvent::Error {
            message: message.into(),
        }
    }
}
