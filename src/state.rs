//! Header and name-tag state behind the relay endpoints.
//!
//! `OverlayState` is the key-value service the HTTP handlers talk to. It
//! owns an injected clock and storage backend so tests control time and
//! durability. Saves and refreshes are independent:
//! - a save overwrites the record and stamps `timestamp`
//! - a refresh stamps `refreshTimestamp` and, for slots that already hold
//!   saved data, re-stamps `timestamp` without touching the content
//!
//! Stamps are strictly increasing per record, so consumers always observe
//! a bump even when two requests land in the same millisecond.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::storage::{KvBackend, StoreKey};
use crate::types::{HeaderView, NameTag, NameTagView, Slot, SlotTarget, DEFAULT_HEADER_TEXT};

const HEADER_RESOURCE: &str = "header";
const HEADER_ID: &str = "main";
const NAMETAG_RESOURCE: &str = "nametag";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HeaderRecord {
    text: Option<String>,
    saved_at: i64,
    refreshed_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SlotRecord {
    tag: Option<NameTag>,
    saved_at: i64,
    refreshed_at: i64,
}

/// Stored header caption and name tags.
pub struct OverlayState {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    /// Serialises read-modify-write cycles. Last write wins.
    write_lock: Mutex<()>,
}

impl OverlayState {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Next stamp after `prev`: the current time, or `prev + 1` if the
    /// clock has not moved past it.
    fn stamp_after(&self, prev: i64) -> i64 {
        self.clock.now_millis().max(prev + 1)
    }

    // -- Header ------------------------------------------------------------

    pub async fn header(&self) -> Result<HeaderView> {
        let record = self.load_header().await?;
        Ok(HeaderView {
            text: record
                .text
                .unwrap_or_else(|| DEFAULT_HEADER_TEXT.to_string()),
            timestamp: record.saved_at,
            refresh_timestamp: record.refreshed_at,
        })
    }

    /// Overwrite the caption. Returns the stored view.
    pub async fn save_header(&self, text: String) -> Result<HeaderView> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_header().await?;
        record.saved_at = self.stamp_after(record.saved_at);
        record.text = Some(text);
        self.store(&Self::header_key(), &record).await?;

        debug!(text = ?record.text, saved_at = record.saved_at, "Header saved");
        Ok(HeaderView {
            text: record.text.unwrap_or_default(),
            timestamp: record.saved_at,
            refresh_timestamp: record.refreshed_at,
        })
    }

    /// Bump the header refresh stamp. Returns the new stamp.
    pub async fn refresh_header(&self) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_header().await?;
        record.refreshed_at = self.stamp_after(record.refreshed_at);
        self.store(&Self::header_key(), &record).await?;

        info!(refresh_timestamp = record.refreshed_at, "Header refresh requested");
        Ok(record.refreshed_at)
    }

    // -- Name tags ---------------------------------------------------------

    pub async fn nametag(&self, slot: Slot) -> Result<NameTagView> {
        let record = self.load_slot(slot).await?;
        Ok(Self::view(slot, record))
    }

    /// Overwrite a slot's name tag. Always persists, even when the fields
    /// equal the defaults. Returns the save stamp.
    pub async fn save_nametag(&self, slot: Slot, tag: NameTag) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load_slot(slot).await?;
        record.saved_at = self.stamp_after(record.saved_at);
        debug!(slot = %slot, tag = %tag, saved_at = record.saved_at, "Name tag saved");
        record.tag = Some(tag);
        self.store(&Self::slot_key(slot), &record).await?;
        Ok(record.saved_at)
    }

    /// Bump refresh stamps for the targeted slots. Slots with saved data
    /// also get their save stamp renewed. All targeted slots share one
    /// stamp, which is returned.
    pub async fn refresh_nametags(&self, target: SlotTarget) -> Result<i64> {
        let _guard = self.write_lock.lock().await;

        let slots = target.slots();
        let mut records = Vec::with_capacity(slots.len());
        for slot in &slots {
            records.push((*slot, self.load_slot(*slot).await?));
        }

        let latest = records
            .iter()
            .map(|(_, r)| r.refreshed_at.max(r.saved_at))
            .max()
            .unwrap_or(0);
        let stamp = self.stamp_after(latest);

        for (slot, mut record) in records {
            record.refreshed_at = stamp;
            if record.tag.is_some() {
                record.saved_at = stamp;
            }
            self.store(&Self::slot_key(slot), &record).await?;
        }

        info!(slots = ?target, refresh_timestamp = stamp, "Name tag refresh requested");
        Ok(stamp)
    }

    /// Drop every name tag. The only way a slot returns to its defaults.
    pub async fn reset_nametags(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend
            .clear_resource(NAMETAG_RESOURCE)
            .await
            .context("Failed to reset name tags")?;
        info!("All name tags reset");
        Ok(())
    }

    // -- Helpers -----------------------------------------------------------

    fn view(slot: Slot, record: SlotRecord) -> NameTagView {
        NameTagView {
            id: slot,
            is_default: record.tag.is_none(),
            tag: record.tag.unwrap_or_default(),
            timestamp: record.saved_at,
            refresh_timestamp: record.refreshed_at,
        }
    }

    fn header_key() -> StoreKey {
        StoreKey::new(HEADER_RESOURCE, HEADER_ID)
    }

    fn slot_key(slot: Slot) -> StoreKey {
        StoreKey::new(NAMETAG_RESOURCE, slot)
    }

    async fn load_header(&self) -> Result<HeaderRecord> {
        self.load(&Self::header_key()).await
    }

    async fn load_slot(&self, slot: Slot) -> Result<SlotRecord> {
        self.load(&Self::slot_key(slot)).await
    }

    async fn load<T: for<'de> Deserialize<'de> + Default>(&self, key: &StoreKey) -> Result<T> {
        match self.backend.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Corrupt record at {key}")),
            None => Ok(T::default()),
        }
    }

    async fn store<T: Serialize>(&self, key: &StoreKey, record: &T) -> Result<()> {
        let value = serde_json::to_value(record).context("Failed to serialise record")?;
        self.backend.put(key, value).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
