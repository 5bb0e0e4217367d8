//! Control panel operations.
//!
//! The operator-facing side: edits are pushed to the relay for remote
//! overlays, then land in the local settings stores. Same-machine overlays
//! reload from the relay when a store signals, so the signal only fires
//! once the push has finished. Pushes are best-effort; explicit refresh
//! requests are not, so the operator sees when a refresh did not go out.

pub mod rooms;
pub mod urls;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::RoomConfig;
use crate::overlay::ticker::{parse_speed, DEFAULT_SPEED};
use crate::overlay::{CustomLogos, RelayClient, TickerInputs};
use crate::storage::{KvBackend, StoreKey};
use crate::sync::{BackendStore, MemoryStore, Store};
use crate::types::{
    NameTag, OverlayError, RefreshResponse, Slot, SlotTarget, DEFAULT_HEADER_TEXT, DEFAULT_NAME,
    DEFAULT_SUBTEXT,
};

pub use urls::{base_url, OverlayUrls};

/// Ticker list a fresh panel starts with.
pub const DEFAULT_TICKERS: [&str; 17] = [
    "$ASST", "$SATA", "$MSTR", "$STRC", "$STRF", "$STRK", "$STRD", "$MTPLF", "$MARA", "$RIOT",
    "$COIN", "BTC", "GLD", "$DXY", "$TLT", "$QQQ", "$SPY",
];

/// Largest accepted logo image, decoded.
pub const MAX_LOGO_BYTES: usize = 2 * 1024 * 1024;

const PANEL_RESOURCE: &str = "panel";

pub fn default_tickers() -> Vec<String> {
    DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Settings stores
// ---------------------------------------------------------------------------

/// Every settings key the panel writes and the overlays read.
#[derive(Clone)]
pub struct SettingsBundle {
    pub tickers: Arc<dyn Store<Vec<String>>>,
    pub custom_logos: Arc<dyn Store<CustomLogos>>,
    pub header: Arc<dyn Store<String>>,
    pub nametags: Arc<dyn Store<Vec<NameTag>>>,
    /// Bumped on every name-tag save so local overlays reload.
    pub nametags_stamp: Arc<dyn Store<i64>>,
    pub ticker_speed: Arc<dyn Store<u32>>,
    /// Speed for a fresh or reset panel, and for unparsable input.
    pub default_speed: u32,
}

impl SettingsBundle {
    pub fn in_memory(room: &RoomConfig, default_speed: u32) -> Self {
        let default_speed = speed_or_builtin(default_speed);
        Self {
            tickers: Arc::new(MemoryStore::new(default_tickers())),
            custom_logos: Arc::new(MemoryStore::new(CustomLogos::new())),
            header: Arc::new(MemoryStore::new(DEFAULT_HEADER_TEXT.to_string())),
            nametags: Arc::new(MemoryStore::new(rooms::initialize_nametags(room))),
            nametags_stamp: Arc::new(MemoryStore::new(0)),
            ticker_speed: Arc::new(MemoryStore::new(default_speed)),
            default_speed,
        }
    }

    /// Settings persisted through `backend`, with defaults for unset keys.
    pub async fn open(backend: Arc<dyn KvBackend>, room: &RoomConfig, default_speed: u32) -> Result<Self> {
        let default_speed = speed_or_builtin(default_speed);
        let key = |id: &str| StoreKey::new(PANEL_RESOURCE, id);
        Ok(Self {
            tickers: Arc::new(BackendStore::open(backend.clone(), key("tickers"), default_tickers()).await?),
            custom_logos: Arc::new(
                BackendStore::open(backend.clone(), key("custom_logos"), CustomLogos::new()).await?,
            ),
            header: Arc::new(
                BackendStore::open(backend.clone(), key("header"), DEFAULT_HEADER_TEXT.to_string()).await?,
            ),
            nametags: Arc::new(
                BackendStore::open(backend.clone(), key("nametags"), rooms::initialize_nametags(room)).await?,
            ),
            nametags_stamp: Arc::new(BackendStore::open(backend.clone(), key("nametags_stamp"), 0i64).await?),
            ticker_speed: Arc::new(BackendStore::open(backend, key("ticker_speed"), default_speed).await?),
            default_speed,
        })
    }

    /// The subset the ticker tape reads.
    pub fn ticker_inputs(&self) -> TickerInputs {
        TickerInputs {
            tickers: self.tickers.clone(),
            custom_logos: self.custom_logos.clone(),
            speed: self.ticker_speed.clone(),
        }
    }
}

fn speed_or_builtin(speed: u32) -> u32 {
    if speed == 0 {
        DEFAULT_SPEED
    } else {
        speed
    }
}

// ---------------------------------------------------------------------------
// Logo upload validation
// ---------------------------------------------------------------------------

/// Check an uploaded logo: an image data URL no larger than [`MAX_LOGO_BYTES`].
pub fn validate_logo(data_url: &str) -> Result<(), OverlayError> {
    let not_image = || OverlayError::invalid("Please select an image file");
    let rest = data_url.strip_prefix("data:").ok_or_else(not_image)?;
    let (meta, payload) = rest.split_once(',').ok_or_else(not_image)?;
    if !meta.starts_with("image/") {
        return Err(not_image());
    }

    let size = if meta.ends_with(";base64") {
        base64_decoded_len(payload)
    } else {
        urlencoding::decode_binary(payload.as_bytes()).len()
    };
    if size > MAX_LOGO_BYTES {
        return Err(OverlayError::invalid(
            "Image file too large. Please use an image smaller than 2MB.",
        ));
    }
    Ok(())
}

fn base64_decoded_len(payload: &str) -> usize {
    let trimmed = payload.trim_end();
    let padding = trimmed.bytes().rev().take_while(|&b| b == b'=').count().min(2);
    (trimmed.len() / 4 * 3).saturating_sub(padding)
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

pub struct ControlPanel {
    settings: SettingsBundle,
    relay: Option<Arc<RelayClient>>,
    room: RoomConfig,
    clock: Arc<dyn Clock>,
}

impl ControlPanel {
    pub fn new(
        settings: SettingsBundle,
        relay: Option<Arc<RelayClient>>,
        room: RoomConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            relay,
            room,
            clock,
        }
    }

    pub fn settings(&self) -> &SettingsBundle {
        &self.settings
    }

    /// Fill missing room links, then push header and name tags to the relay.
    pub async fn load(&self) -> Result<(), OverlayError> {
        let mut tags = self.settings.nametags.get();
        if rooms::ensure_room_links(&mut tags, &self.room) {
            self.settings.nametags.set(tags).await?;
        }
        self.sync_to_relay().await;
        Ok(())
    }

    /// Push the stored header and every name tag. Failures are logged.
    pub async fn sync_to_relay(&self) {
        let Some(relay) = &self.relay else {
            return;
        };
        let header = self.settings.header.get();
        if let Err(e) = relay.save_header(header_for_relay(&header)).await {
            warn!(error = %e, "Header sync to relay failed");
        }
        for (index, tag) in self.settings.nametags.get().iter().enumerate() {
            let Some(slot) = Slot::new(index as u8) else {
                continue;
            };
            if let Err(e) = relay.save_nametag(slot, &for_relay(tag)).await {
                warn!(slot = %slot, error = %e, "Name tag sync to relay failed");
            }
        }
        info!(relay = relay.base_url(), "Panel state synced to relay");
    }

    // -- Tickers -----------------------------------------------------------

    pub fn tickers(&self) -> Vec<String> {
        self.settings.tickers.get()
    }

    /// Append an empty entry. Returns its index.
    pub async fn add_ticker(&self) -> Result<usize, OverlayError> {
        let mut tickers = self.settings.tickers.get();
        tickers.push(String::new());
        let index = tickers.len() - 1;
        self.settings.tickers.set(tickers).await?;
        Ok(index)
    }

    pub async fn update_ticker(&self, index: usize, value: &str) -> Result<(), OverlayError> {
        let mut tickers = self.settings.tickers.get();
        let entry = tickers
            .get_mut(index)
            .ok_or_else(|| OverlayError::invalid("Invalid ticker index"))?;
        *entry = value.trim().to_string();
        self.settings.tickers.set(tickers).await?;
        Ok(())
    }

    /// Remove an entry and its custom logo. Returns the removed symbol.
    pub async fn remove_ticker(&self, index: usize) -> Result<String, OverlayError> {
        let mut tickers = self.settings.tickers.get();
        if index >= tickers.len() {
            return Err(OverlayError::invalid("Invalid ticker index"));
        }
        let removed = tickers.remove(index);

        let mut logos = self.settings.custom_logos.get();
        if logos.remove(&removed).is_some() {
            self.settings.custom_logos.set(logos).await?;
        }
        self.settings.tickers.set(tickers).await?;
        Ok(removed)
    }

    /// Attach an uploaded logo to the ticker at `index`.
    pub async fn upload_logo(&self, index: usize, data_url: &str) -> Result<(), OverlayError> {
        validate_logo(data_url)?;
        let symbol = self
            .settings
            .tickers
            .get()
            .get(index)
            .cloned()
            .ok_or_else(|| OverlayError::invalid("Invalid ticker index"))?;

        let mut logos = self.settings.custom_logos.get();
        logos.insert(symbol, data_url.to_string());
        self.settings.custom_logos.set(logos).await?;
        Ok(())
    }

    /// Store a speed typed by the operator. Returns the value stored.
    pub async fn set_ticker_speed(&self, raw: &str) -> Result<u32, OverlayError> {
        let speed = parse_speed(raw, self.settings.default_speed);
        self.settings.ticker_speed.set(speed).await?;
        Ok(speed)
    }

    /// Tickers back to the default list, logos cleared, speed back to the
    /// configured default.
    pub async fn reset_to_defaults(&self) -> Result<(), OverlayError> {
        self.settings.custom_logos.set(CustomLogos::new()).await?;
        self.settings.tickers.set(default_tickers()).await?;
        self.settings.ticker_speed.set(self.settings.default_speed).await?;
        info!("Ticker settings reset to defaults");
        Ok(())
    }

    // -- Header ------------------------------------------------------------

    /// Push the caption, then store it locally. A blank caption goes to
    /// the relay as the default text.
    pub async fn save_header(&self, text: &str) -> Result<(), OverlayError> {
        if let Some(relay) = &self.relay {
            if let Err(e) = relay.save_header(header_for_relay(text)).await {
                warn!(error = %e, "Header push to relay failed");
            }
        }
        self.settings.header.set(text.to_string()).await?;
        Ok(())
    }

    // -- Name tags ---------------------------------------------------------

    pub fn nametags(&self) -> Vec<NameTag> {
        self.settings.nametags.get()
    }

    /// Save one camera's tag locally, bump the change stamp, and push it.
    pub async fn save_nametag(&self, index: usize, tag: NameTag) -> Result<(), OverlayError> {
        let mut tags = self.settings.nametags.get();
        let entry = tags
            .get_mut(index)
            .ok_or_else(|| OverlayError::invalid("Invalid name tag id"))?;
        *entry = tag.clone();
        self.settings.nametags.set(tags).await?;

        if let (Some(relay), Some(slot)) = (&self.relay, u8::try_from(index).ok().and_then(Slot::new)) {
            if let Err(e) = relay.save_nametag(slot, &for_relay(&tag)).await {
                warn!(slot = %slot, error = %e, "Name tag push to relay failed");
            }
        }

        // Local overlays reload on this stamp, so bump it after the push.
        let stamp = self.clock.now_millis().max(self.settings.nametags_stamp.get() + 1);
        self.settings.nametags_stamp.set(stamp).await?;
        Ok(())
    }

    /// Append a camera entry prefilled from the room. Returns its index.
    pub async fn add_nametag(&self) -> Result<usize, OverlayError> {
        let mut tags = self.settings.nametags.get();
        let index = tags.len();
        tags.push(rooms::default_nametag(&self.room, index));
        self.settings.nametags.set(tags).await?;
        Ok(index)
    }

    // -- Refresh triggers --------------------------------------------------

    fn relay(&self) -> Result<&RelayClient, OverlayError> {
        self.relay
            .as_deref()
            .ok_or_else(|| OverlayError::Relay("No relay configured".to_string()))
    }

    pub async fn refresh_nametag(&self, slot: Slot) -> Result<RefreshResponse, OverlayError> {
        self.relay()?
            .refresh_nametags(SlotTarget::One(slot))
            .await
            .map_err(relay_error)
    }

    pub async fn refresh_header(&self) -> Result<RefreshResponse, OverlayError> {
        self.relay()?.refresh_header().await.map_err(relay_error)
    }

    /// Refresh every name tag and the header.
    pub async fn refresh_all(&self) -> Result<(RefreshResponse, RefreshResponse), OverlayError> {
        let relay = self.relay()?;
        let (tags, header) = tokio::join!(relay.refresh_nametags(SlotTarget::All), relay.refresh_header());
        Ok((tags.map_err(relay_error)?, header.map_err(relay_error)?))
    }
}

/// Relay copy of the caption: blank becomes the default text.
fn header_for_relay(text: &str) -> &str {
    if text.trim().is_empty() {
        DEFAULT_HEADER_TEXT
    } else {
        text
    }
}

/// Relay copy of a panel tag: empty name/subtext become display defaults.
fn for_relay(tag: &NameTag) -> NameTag {
    let mut tag = tag.clone();
    if tag.name.is_empty() {
        tag.name = DEFAULT_NAME.to_string();
    }
    if tag.subtext.is_empty() {
        tag.subtext = DEFAULT_SUBTEXT.to_string();
    }
    tag
}

fn relay_error(e: anyhow::Error) -> OverlayError {
    OverlayError::Relay(format!("{e:#}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
