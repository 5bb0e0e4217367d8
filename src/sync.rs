//! Local publish/subscribe settings stores.
//!
//! A [`Store`] holds one value and notifies every subscriber when it is
//! set, including subscribers in the same process as the writer. Overlay
//! documents watch these to pick up operator changes without polling.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::storage::{KvBackend, StoreKey};

#[async_trait]
pub trait Store<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Current value.
    fn get(&self) -> T;

    /// Replace the value and notify subscribers.
    async fn set(&self, value: T) -> Result<()>;

    /// Receiver that wakes on every `set`.
    fn subscribe(&self) -> watch::Receiver<T>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

pub struct MemoryStore<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> MemoryStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Store<T> for MemoryStore<T> {
    fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    async fn set(&self, value: T) -> Result<()> {
        self.tx.send_replace(value);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Persisted
// ---------------------------------------------------------------------------

/// Store persisted under one backend key. Writes go to the backend first so
/// subscribers never observe a value that failed to save.
pub struct BackendStore<T> {
    backend: Arc<dyn KvBackend>,
    key: StoreKey,
    tx: watch::Sender<T>,
}

impl<T> BackendStore<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Open the store, loading the saved value or falling back to `default`.
    pub async fn open(backend: Arc<dyn KvBackend>, key: StoreKey, default: T) -> Result<Self> {
        let initial = match backend.get(&key).await? {
            Some(raw) => serde_json::from_value(raw)
                .with_context(|| format!("Corrupt value stored at {key}"))?,
            None => default,
        };
        let (tx, _rx) = watch::channel(initial);
        Ok(Self { backend, key, tx })
    }
}

#[async_trait]
impl<T> Store<T> for BackendStore<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    async fn set(&self, value: T) -> Result<()> {
        let raw = serde_json::to_value(&value).context("Failed to serialize store value")?;
        self.backend
            .put(&self.key, raw)
            .await
            .with_context(|| format!("Failed to persist {}", self.key))?;
        debug!(key = %self.key, "Store updated");
        self.tx.send_replace(value);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}
