//! JSON file backend.
//!
//! Keeps every entry in memory and rewrites the whole file after each
//! write. Writes go to a temporary sibling first and are renamed into
//! place so a crash never leaves a half-written file. The in-memory map
//! only changes once the file write has succeeded.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{KvBackend, StoreKey};

pub struct JsonFileBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileBackend {
    /// Open (or lazily create) the file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let json = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read store from {}", path.display()))?;
            let entries: BTreeMap<String, Value> = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse store from {}", path.display()))?;
            info!(path = %path.display(), entries = entries.len(), "Store loaded from disk");
            entries
        } else {
            info!(path = %path.display(), "No saved store found, starting fresh");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries).context("Failed to serialise store")?;

        let tmp = self
            .path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        let written = match tokio::fs::write(&tmp, json).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path)
                .await
                .with_context(|| format!("Failed to move store into {}", self.path.display())),
            Err(e) => Err(e).with_context(|| format!("Failed to write store to {}", tmp.display())),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        debug!(path = %self.path.display(), entries = entries.len(), "Store saved");
        Ok(())
    }
}

#[async_trait]
impl KvBackend for JsonFileBackend {
    async fn get(&self, key: &StoreKey) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(&key.flat()).cloned())
    }

    async fn put(&self, key: &StoreKey, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.flat(), value);
        self.flush(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn clear_resource(&self, resource: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let prefix = format!("{resource}/");
        let mut next = entries.clone();
        next.retain(|k, _| !k.starts_with(&prefix));
        self.flush(&next).await?;
        *entries = next;
        Ok(())
    }

    fn name(&self) -> &str {
        "json"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
