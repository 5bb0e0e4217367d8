//! Persistence layer.
//!
//! A tiny key-value abstraction keyed by `(resource, id)`. The relay keeps
//! header and name-tag records here, and the control panel keeps its
//! settings here. Three backends:
//! - `MemoryBackend`: process memory, reset on restart
//! - `JsonFileBackend`: one pretty-printed JSON file
//! - `SqliteBackend`: a single `kv` table via sqlx

pub mod json_file;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{BackendKind, StorageConfig};

pub use json_file::JsonFileBackend;
pub use sqlite::SqliteBackend;

/// Address of one stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    pub resource: String,
    pub id: String,
}

impl StoreKey {
    pub fn new(resource: impl Into<String>, id: impl ToString) -> Self {
        Self {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Flat `resource/id` form used by file-based backends.
    pub fn flat(&self) -> String {
        format!("{}/{}", self.resource, self.id)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.id)
    }
}

/// Abstraction over key-value storage.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetch a value. `None` when the key was never written.
    async fn get(&self, key: &StoreKey) -> Result<Option<Value>>;

    /// Insert or overwrite a value.
    async fn put(&self, key: &StoreKey, value: Value) -> Result<()>;

    /// Remove every key under a resource.
    async fn clear_resource(&self, resource: &str) -> Result<()>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// In-memory backend. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<StoreKey, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &StoreKey) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &StoreKey, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.clone(), value);
        Ok(())
    }

    async fn clear_resource(&self, resource: &str) -> Result<()> {
        self.entries.write().await.retain(|k, _| k.resource != resource);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Open the backend selected in configuration.
pub async fn open_backend(cfg: &StorageConfig) -> Result<Arc<dyn KvBackend>> {
    let backend: Arc<dyn KvBackend> = match cfg.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Json => Arc::new(JsonFileBackend::open(cfg.path_or_default()).await?),
        BackendKind::Sqlite => Arc::new(SqliteBackend::connect(cfg.path_or_default()).await?),
    };
    info!(backend = backend.name(), "Storage backend ready");
    Ok(backend)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
