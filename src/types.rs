//! Shared types for the overlay relay.
//!
//! These types form the wire and data model used by the relay service,
//! the relay client, and the overlay documents. Keeping them in one place
//! lets the server and the pollers agree on the JSON shapes without
//! depending on each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caption shown by the header overlay until an operator saves one.
pub const DEFAULT_HEADER_TEXT: &str = "TRUE NORTH";

/// Default name-tag fields.
pub const DEFAULT_NAME: &str = "Name";
pub const DEFAULT_SUBTEXT: &str = "Subtext";

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// A camera slot (0–5). One name tag per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Slot(u8);

impl Slot {
    /// Number of camera slots.
    pub const COUNT: u8 = 6;

    /// Slot addressed when a request carries no id.
    pub const FIRST: Slot = Slot(0);

    pub fn new(index: u8) -> Option<Self> {
        (index < Self::COUNT).then_some(Slot(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Iterate over every slot in order.
    pub fn all() -> impl Iterator<Item = Slot> {
        (0..Self::COUNT).map(Slot)
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Slot::new(value).ok_or_else(|| format!("slot {value} out of range 0..{}", Slot::COUNT))
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Slot {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Slot::new)
            .ok_or_else(|| OverlayError::invalid("Invalid name tag id"))
    }
}

/// Which slots a refresh applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTarget {
    One(Slot),
    All,
}

impl SlotTarget {
    /// Parse the `id` query value of a refresh request.
    /// A missing id and the literal `all` both address every slot.
    pub fn parse(raw: Option<&str>) -> Result<Self, OverlayError> {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Ok(SlotTarget::All),
            Some(other) => other.parse().map(SlotTarget::One),
        }
    }

    pub fn slots(self) -> Vec<Slot> {
        match self {
            SlotTarget::One(slot) => vec![slot],
            SlotTarget::All => Slot::all().collect(),
        }
    }

    /// Query-string form used by the relay client.
    pub fn as_query(self) -> String {
        match self {
            SlotTarget::One(slot) => slot.to_string(),
            SlotTarget::All => "all".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Name tags
// ---------------------------------------------------------------------------

/// One camera's name tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameTag {
    pub name: String,
    pub subtext: String,
    /// Join link handed to the person on camera.
    pub human_link: String,
    /// View link used as the OBS video source.
    pub obs_link: String,
    /// Screenshare view link; empty when the slot has none.
    #[serde(default)]
    pub obs_screenshare_link: String,
}

impl Default for NameTag {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            subtext: DEFAULT_SUBTEXT.to_string(),
            human_link: String::new(),
            obs_link: String::new(),
            obs_screenshare_link: String::new(),
        }
    }
}

impl fmt::Display for NameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.subtext)
    }
}

/// POST body for `/api/nametag-data`. Absent fields take the name-tag
/// defaults; unknown fields are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NameTagUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subtext: Option<String>,
    #[serde(default)]
    pub human_link: Option<String>,
    #[serde(default)]
    pub obs_link: Option<String>,
    #[serde(default)]
    pub obs_screenshare_link: Option<String>,
}

impl NameTagUpdate {
    /// Materialise the full record, filling absent fields with defaults.
    pub fn into_name_tag(self) -> NameTag {
        let defaults = NameTag::default();
        NameTag {
            name: self.name.unwrap_or(defaults.name),
            subtext: self.subtext.unwrap_or(defaults.subtext),
            human_link: self.human_link.unwrap_or(defaults.human_link),
            obs_link: self.obs_link.unwrap_or(defaults.obs_link),
            obs_screenshare_link: self
                .obs_screenshare_link
                .unwrap_or(defaults.obs_screenshare_link),
        }
    }
}

/// GET response of `/api/nametag-data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameTagView {
    pub id: Slot,
    #[serde(flatten)]
    pub tag: NameTag,
    /// When the slot was last saved (ms since epoch), 0 if never.
    pub timestamp: i64,
    pub refresh_timestamp: i64,
    /// True when the slot has never been saved.
    pub is_default: bool,
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// POST body for `/api/header-data`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderUpdate {
    #[serde(default)]
    pub text: Option<String>,
}

impl HeaderUpdate {
    pub fn into_text(self) -> String {
        self.text.unwrap_or_else(|| DEFAULT_HEADER_TEXT.to_string())
    }
}

/// GET response of `/api/header-data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderView {
    pub text: String,
    /// When the caption was last saved (ms since epoch), 0 if never.
    pub timestamp: i64,
    pub refresh_timestamp: i64,
}

/// Response to a successful header save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderSaved {
    pub success: bool,
    pub text: String,
    pub timestamp: i64,
}

/// Response to a successful name-tag save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameTagSaved {
    pub success: bool,
    pub id: Slot,
    pub timestamp: i64,
}

/// Response to a refresh (PUT) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Slot>,
    pub refresh_timestamp: i64,
}

// ---------------------------------------------------------------------------
// Tickers
// ---------------------------------------------------------------------------

/// A resolved ticker quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerQuote {
    pub ticker: String,
    pub price: Decimal,
    pub change: Decimal,
    pub percent_change: Decimal,
    pub logo_url: Option<String>,
    pub name: String,
    pub last_updated: DateTime<Utc>,
}

/// Degraded quote returned when an upstream lookup failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerFallback {
    pub ticker: String,
    pub price: Decimal,
    pub change: Decimal,
    pub percent_change: Decimal,
    pub logo_url: Option<String>,
    pub error: String,
    pub fallback: bool,
}

impl TickerFallback {
    /// Zeroed payload carrying the failure message.
    pub fn zeroed(ticker: impl Into<String>, logo_url: Option<String>, error: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            price: Decimal::ZERO,
            change: Decimal::ZERO,
            percent_change: Decimal::ZERO,
            logo_url,
            error: error.into(),
            fallback: true,
        }
    }
}

/// Body of `/api/ticker-data`: either a full quote or the fallback shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TickerPayload {
    Fallback(TickerFallback),
    Quote(TickerQuote),
}

impl TickerPayload {
    pub fn ticker(&self) -> &str {
        match self {
            TickerPayload::Quote(q) => &q.ticker,
            TickerPayload::Fallback(f) => &f.ticker,
        }
    }

    pub fn set_ticker(&mut self, ticker: impl Into<String>) {
        match self {
            TickerPayload::Quote(q) => q.ticker = ticker.into(),
            TickerPayload::Fallback(f) => f.ticker = ticker.into(),
        }
    }

    pub fn price(&self) -> Decimal {
        match self {
            TickerPayload::Quote(q) => q.price,
            TickerPayload::Fallback(f) => f.price,
        }
    }

    pub fn change(&self) -> Decimal {
        match self {
            TickerPayload::Quote(q) => q.change,
            TickerPayload::Fallback(f) => f.change,
        }
    }

    pub fn percent_change(&self) -> Decimal {
        match self {
            TickerPayload::Quote(q) => q.percent_change,
            TickerPayload::Fallback(f) => f.percent_change,
        }
    }

    pub fn logo_url(&self) -> Option<&str> {
        match self {
            TickerPayload::Quote(q) => q.logo_url.as_deref(),
            TickerPayload::Fallback(f) => f.logo_url.as_deref(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TickerPayload::Fallback(_))
    }
}

impl fmt::Display for TickerPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickerPayload::Quote(q) => write!(
                f,
                "{} {} ({}, {}%)",
                q.ticker,
                q.price.round_dp(2),
                q.change.round_dp(2),
                q.percent_change.round_dp(2)
            ),
            TickerPayload::Fallback(fb) => write!(f, "{} unavailable: {}", fb.ticker, fb.error),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the relay and the control panel.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{error}")]
    InvalidRequest {
        error: String,
        message: Option<String>,
    },

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Relay error: {0}")]
    Relay(String),
}

impl OverlayError {
    /// Client input error with no extra detail.
    pub fn invalid(error: impl Into<String>) -> Self {
        OverlayError::InvalidRequest {
            error: error.into(),
            message: None,
        }
    }

    /// Client input error with the underlying parser message.
    pub fn invalid_body(message: impl Into<String>) -> Self {
        OverlayError::InvalidRequest {
            error: "Invalid request body".to_string(),
            message: Some(message.into()),
        }
    }
}

impl From<anyhow::Error> for OverlayError {
    fn from(e: anyhow::Error) -> Self {
        OverlayError::Storage(format!("{e:#}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
