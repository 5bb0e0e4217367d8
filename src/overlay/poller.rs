//! Header and name-tag overlay documents.
//!
//! A document starts `Uninitialized`, loads once, then keeps `Displaying`.
//! It re-fetches on every poll tick and on local change signals, and
//! adopts the full snapshot whenever either its saved or its refresh
//! timestamp moved. There is no diffing: a bump means "reload everything".

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::RelayClient;
use crate::types::{HeaderView, NameTagView, Slot};

/// The pair of stamps a document watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshMarker {
    pub saved: i64,
    pub refreshed: i64,
}

/// Where a document gets its state from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    type Snapshot: Clone + Send + Sync + 'static;

    async fn fetch(&self) -> Result<Self::Snapshot>;

    fn marker(snapshot: &Self::Snapshot) -> RefreshMarker;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState<T> {
    Uninitialized,
    Displaying { snapshot: T, marker: RefreshMarker },
}

pub struct OverlayDocument<S: SnapshotSource> {
    source: S,
    state: DocumentState<S::Snapshot>,
    display: watch::Sender<Option<S::Snapshot>>,
}

impl<S: SnapshotSource> OverlayDocument<S> {
    pub fn new(source: S) -> Self {
        let (display, _rx) = watch::channel(None);
        Self {
            source,
            state: DocumentState::Uninitialized,
            display,
        }
    }

    pub fn state(&self) -> &DocumentState<S::Snapshot> {
        &self.state
    }

    /// What the document currently shows. `None` until the first load.
    pub fn subscribe(&self) -> watch::Receiver<Option<S::Snapshot>> {
        self.display.subscribe()
    }

    /// Fetch and adopt the snapshot if it changed. Returns whether it did.
    pub async fn poll_once(&mut self) -> Result<bool> {
        let snapshot = self.source.fetch().await?;
        let marker = S::marker(&snapshot);
        let changed = match &self.state {
            DocumentState::Uninitialized => true,
            DocumentState::Displaying { marker: current, .. } => *current != marker,
        };
        if changed {
            self.adopt(snapshot, marker);
        }
        Ok(changed)
    }

    /// Fetch and adopt unconditionally.
    pub async fn reload(&mut self) -> Result<()> {
        let snapshot = self.source.fetch().await?;
        let marker = S::marker(&snapshot);
        self.adopt(snapshot, marker);
        Ok(())
    }

    fn adopt(&mut self, snapshot: S::Snapshot, marker: RefreshMarker) {
        debug!(saved = marker.saved, refreshed = marker.refreshed, "Overlay document updated");
        self.display.send_replace(Some(snapshot.clone()));
        self.state = DocumentState::Displaying { snapshot, marker };
    }

    /// Poll every `every` and reload whenever `local` changes. Runs until
    /// the task is dropped. Fetch errors keep the current display.
    pub async fn run<T>(mut self, every: Duration, mut local: Option<watch::Receiver<T>>)
    where
        T: Send + Sync,
    {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "Overlay poll failed");
                    }
                }
                live = local_change(&mut local) => {
                    if !live {
                        local = None;
                        continue;
                    }
                    if let Err(e) = self.reload().await {
                        warn!(error = %e, "Overlay reload failed");
                    }
                }
            }
        }
    }
}

/// Resolves when the local signal fires. `false` when its sender is gone;
/// never resolves without a signal.
async fn local_change<T>(rx: &mut Option<watch::Receiver<T>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Relay-backed sources
// ---------------------------------------------------------------------------

pub struct HeaderFeed {
    client: Arc<RelayClient>,
}

impl HeaderFeed {
    pub fn new(client: Arc<RelayClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotSource for HeaderFeed {
    type Snapshot = HeaderView;

    async fn fetch(&self) -> Result<HeaderView> {
        self.client.header().await
    }

    fn marker(snapshot: &HeaderView) -> RefreshMarker {
        RefreshMarker {
            saved: snapshot.timestamp,
            refreshed: snapshot.refresh_timestamp,
        }
    }
}

pub struct NameTagFeed {
    client: Arc<RelayClient>,
    slot: Slot,
}

impl NameTagFeed {
    pub fn new(client: Arc<RelayClient>, slot: Slot) -> Self {
        Self { client, slot }
    }
}

#[async_trait]
impl SnapshotSource for NameTagFeed {
    type Snapshot = NameTagView;

    async fn fetch(&self) -> Result<NameTagView> {
        self.client.nametag(self.slot).await
    }

    fn marker(snapshot: &NameTagView) -> RefreshMarker {
        RefreshMarker {
            saved: snapshot.timestamp,
            refreshed: snapshot.refresh_timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
