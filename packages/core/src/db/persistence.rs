//! Persistence Gateway - load/save abstraction
//!
//! The gateway is the boundary to wherever serialized trees live (an HTTP
//! triple store endpoint, a local file, memory in tests). The core only relies
//! on the call contract below:
//!
//! - `load()` returns either flat node rows (as produced by a query endpoint)
//!   or a whole serialized document for the core to parse
//! - `save(text)` overwrites the stored document; last write wins
//!
//! Failures are reported as [`PersistenceError`] and never retried by the core.

use crate::db::PersistenceError;
use crate::models::NodeRow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// What a gateway hands back from `load()`
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedData {
    /// Flat rows, folded into a tree with `TreeOperations::build_tree_structure`
    Rows(Vec<NodeRow>),
    /// A serialized document, parsed by the serialization pipeline first
    Document(String),
}

/// Abstraction over load/save of the serialized tree
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; saves run on spawned tasks.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Fetch the stored tree
    async fn load(&self) -> Result<LoadedData, PersistenceError>;

    /// Replace the stored tree with `text`
    async fn save(&self, text: String) -> Result<(), PersistenceError>;
}

/// In-memory gateway
///
/// Keeps the last saved document. Optional save delay and failure injection
/// make it usable for exercising timeouts and error paths.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    document: Mutex<Option<String>>,
    rows: Mutex<Option<Vec<NodeRow>>>,
    save_delay: Option<Duration>,
    fail_with: Option<String>,
    save_count: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a stored document
    pub fn with_document(text: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(text.into())),
            ..Self::default()
        }
    }

    /// Start with query-style rows; `load()` returns these until the first save
    pub fn with_rows(rows: Vec<NodeRow>) -> Self {
        Self {
            rows: Mutex::new(Some(rows)),
            ..Self::default()
        }
    }

    /// Make every save take at least `delay` before completing
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    /// Make every load and save fail with a transport error
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Last document written by a completed save
    pub async fn document(&self) -> Option<String> {
        self.document.lock().await.clone()
    }

    /// Number of saves that reached the store
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn load(&self) -> Result<LoadedData, PersistenceError> {
        if let Some(message) = &self.fail_with {
            return Err(PersistenceError::transport(message.clone()));
        }
        if let Some(rows) = self.rows.lock().await.clone() {
            return Ok(LoadedData::Rows(rows));
        }
        let document = self.document.lock().await.clone().unwrap_or_default();
        Ok(LoadedData::Document(document))
    }

    async fn save(&self, text: String) -> Result<(), PersistenceError> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(PersistenceError::transport(message.clone()));
        }
        *self.rows.lock().await = None;
        *self.document.lock().await = Some(text);
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Gateway backed by a single document on disk
///
/// A missing file loads as an empty document. Saves write a sibling temporary
/// file and rename it over the target, so readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct FileGateway {
    path: PathBuf,
}

impl FileGateway {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn load(&self) -> Result<LoadedData, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(LoadedData::Document(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No document at {}, loading empty", self.path.display());
                Ok(LoadedData::Document(String::new()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, text: String) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, text.as_bytes()).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        tracing::debug!("Wrote {} bytes to {}", text.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_gateway_round_trip() {
        let gateway = MemoryGateway::new();
        assert_eq!(gateway.load().await.unwrap(), LoadedData::Document(String::new()));

        gateway.save("<a> <b> <c> .".to_string()).await.unwrap();
        assert_eq!(
            gateway.load().await.unwrap(),
            LoadedData::Document("<a> <b> <c> .".to_string())
        );
        assert_eq!(gateway.save_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_gateway_rows_until_first_save() {
        let gateway = MemoryGateway::with_rows(vec![NodeRow::new("r", NodeKind::Root)]);
        assert!(matches!(gateway.load().await.unwrap(), LoadedData::Rows(rows) if rows.len() == 1));

        gateway.save(String::new()).await.unwrap();
        assert!(matches!(gateway.load().await.unwrap(), LoadedData::Document(_)));
    }

    #[tokio::test]
    async fn test_failing_gateway_reports_transport_error() {
        let gateway = MemoryGateway::new().failing("endpoint down");
        let err = gateway.save(String::new()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Transport(msg) if msg == "endpoint down"));
        assert_eq!(gateway.save_count(), 0);
    }

    #[tokio::test]
    async fn test_file_gateway_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FileGateway::new(temp_dir.path().join("missing.ttl"));
        assert_eq!(gateway.load().await.unwrap(), LoadedData::Document(String::new()));
    }

    #[tokio::test]
    async fn test_file_gateway_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("tree.ttl");
        let gateway = FileGateway::new(&path);

        gateway.save("first".to_string()).await.unwrap();
        gateway.save("second".to_string()).await.unwrap();

        assert_eq!(gateway.load().await.unwrap(), LoadedData::Document("second".to_string()));
        assert!(!temp_dir.path().join("nested").join("tree.ttl.tmp").exists());
    }
}
