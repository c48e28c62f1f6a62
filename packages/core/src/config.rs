//! Runtime Configuration
//!
//! Defaults match the behavior the editor has always shipped with. Every
//! value can be overridden from the environment with `TrestleConfig::from_env`;
//! unparseable values fall back to the default with a warning.
//!
//! | Variable                   | Field                         |
//! |----------------------------|-------------------------------|
//! | `TRESTLE_BASE_URI`         | `base_uri`                    |
//! | `TRESTLE_AUTO_SAVE`        | `auto_save`                   |
//! | `TRESTLE_SAVE_DEBOUNCE_MS` | `save_debounce_ms`            |
//! | `TRESTLE_SAVE_TIMEOUT_MS`  | `save_timeout_ms`             |
//! | `TRESTLE_WORKER_MODE`      | `serialization.worker_mode`   |

use crate::graph::DEFAULT_BASE_URI;
use crate::operations::DEFAULT_TREE_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default number of nodes mirrored per chunk during a wholesale rebuild
pub const DEFAULT_REBUILD_CHUNK_SIZE: usize = 50;

/// Maximum byte size of one chunk of text handed to the parser
pub const MAX_CHUNK_SIZE: usize = 500_000;

/// Where serialization work runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Background task on a multi-thread runtime, cooperative otherwise
    #[default]
    Auto,
    /// Always hand the job to a background worker task
    Background,
    /// Always run on the caller's task, yielding between chunks
    Cooperative,
}

impl FromStr for WorkerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(WorkerMode::Auto),
            "background" | "worker" => Ok(WorkerMode::Background),
            "cooperative" | "inline" => Ok(WorkerMode::Cooperative),
            other => Err(format!("unknown worker mode '{}'", other)),
        }
    }
}

/// What happens to a save that loses the race against its timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupersededSavePolicy {
    /// Let the gateway call finish in the background; its write may still land
    #[default]
    Detach,
    /// Abort the gateway call at the timeout
    Abort,
}

/// Serialization pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializationConfig {
    pub worker_mode: WorkerMode,
    /// Byte size of each text chunk fed to the parser
    pub max_chunk_size: usize,
    /// Assertions written per step on the cooperative path
    pub cooperative_chunk_size: usize,
    pub base_timeout_ms: u64,
    /// Extra budget per assertion, in microseconds
    pub per_quad_timeout_us: u64,
    pub max_timeout_ms: u64,
    /// Capacity of the worker's request and message channels
    pub channel_capacity: usize,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            worker_mode: WorkerMode::Auto,
            max_chunk_size: MAX_CHUNK_SIZE,
            cooperative_chunk_size: 1000,
            base_timeout_ms: 30_000,
            per_quad_timeout_us: 1000,
            max_timeout_ms: 300_000,
            channel_capacity: 32,
        }
    }
}

impl SerializationConfig {
    /// Timeout budget for a job over `quad_count` assertions
    ///
    /// `base + quad_count * per_quad`, capped at the ceiling.
    pub fn timeout_for(&self, quad_count: usize) -> Duration {
        let scaled = Duration::from_micros(self.per_quad_timeout_us.saturating_mul(quad_count as u64));
        let budget = Duration::from_millis(self.base_timeout_ms).saturating_add(scaled);
        budget.min(Duration::from_millis(self.max_timeout_ms))
    }
}

/// Top-level model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrestleConfig {
    /// Prefix for node subject IRIs
    pub base_uri: String,
    /// Debounced save after every mutation
    pub auto_save: bool,
    pub save_debounce_ms: u64,
    pub save_timeout_ms: u64,
    pub superseded_save_policy: SupersededSavePolicy,
    /// Nodes visited per chunk in chunked traversals
    pub tree_chunk_size: usize,
    /// Nodes mirrored per chunk after a load
    pub rebuild_chunk_size: usize,
    pub serialization: SerializationConfig,
}

impl Default for TrestleConfig {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            auto_save: true,
            save_debounce_ms: 2000,
            save_timeout_ms: 30_000,
            superseded_save_policy: SupersededSavePolicy::Detach,
            tree_chunk_size: DEFAULT_TREE_CHUNK_SIZE,
            rebuild_chunk_size: DEFAULT_REBUILD_CHUNK_SIZE,
            serialization: SerializationConfig::default(),
        }
    }
}

impl TrestleConfig {
    /// Defaults overridden by `TRESTLE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_uri) = lookup("TRESTLE_BASE_URI").filter(|v| !v.trim().is_empty()) {
            config.base_uri = base_uri.trim().to_string();
        }
        config.auto_save = parse_or("TRESTLE_AUTO_SAVE", lookup("TRESTLE_AUTO_SAVE"), config.auto_save);
        config.save_debounce_ms = parse_or(
            "TRESTLE_SAVE_DEBOUNCE_MS",
            lookup("TRESTLE_SAVE_DEBOUNCE_MS"),
            config.save_debounce_ms,
        );
        config.save_timeout_ms = parse_or(
            "TRESTLE_SAVE_TIMEOUT_MS",
            lookup("TRESTLE_SAVE_TIMEOUT_MS"),
            config.save_timeout_ms,
        );
        config.serialization.worker_mode = parse_or(
            "TRESTLE_WORKER_MODE",
            lookup("TRESTLE_WORKER_MODE"),
            config.serialization.worker_mode,
        );

        config
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Ignoring {}={:?}: {}", key, raw, e);
            default
        }
    }
}
