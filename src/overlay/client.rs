//! HTTP client for the relay endpoints.
//!
//! Used by remote overlays to poll and by the control panel to push.

use anyhow::{bail, Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::types::{
    HeaderSaved, HeaderView, NameTag, NameTagSaved, NameTagView, RefreshResponse, Slot, SlotTarget,
    TickerPayload,
};

pub struct RelayClient {
    http: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("obs-overlay/0.1.0")
            .build()
            .context("Failed to build relay HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // -- Tickers -----------------------------------------------------------

    pub async fn ticker(&self, symbol: &str) -> Result<TickerPayload> {
        let resp = self
            .http
            .get(self.url("/api/ticker-data"))
            .query(&[("ticker", symbol)])
            .send()
            .await
            .with_context(|| format!("Ticker request failed for {symbol}"))?;
        decode(resp, "ticker").await
    }

    // -- Header ------------------------------------------------------------

    pub async fn header(&self) -> Result<HeaderView> {
        let resp = self
            .http
            .get(self.url("/api/header-data"))
            .send()
            .await
            .context("Header request failed")?;
        decode(resp, "header").await
    }

    pub async fn save_header(&self, text: &str) -> Result<HeaderSaved> {
        let resp = self
            .http
            .post(self.url("/api/header-data"))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context("Header save failed")?;
        decode(resp, "header save").await
    }

    pub async fn refresh_header(&self) -> Result<RefreshResponse> {
        let resp = self
            .http
            .put(self.url("/api/header-data"))
            .send()
            .await
            .context("Header refresh failed")?;
        decode(resp, "header refresh").await
    }

    // -- Name tags ---------------------------------------------------------

    pub async fn nametag(&self, slot: Slot) -> Result<NameTagView> {
        let resp = self
            .http
            .get(self.url("/api/nametag-data"))
            .query(&[("id", slot.to_string())])
            .send()
            .await
            .with_context(|| format!("Name tag request failed for slot {slot}"))?;
        decode(resp, "name tag").await
    }

    pub async fn save_nametag(&self, slot: Slot, tag: &NameTag) -> Result<NameTagSaved> {
        let resp = self
            .http
            .post(self.url("/api/nametag-data"))
            .query(&[("id", slot.to_string())])
            .json(tag)
            .send()
            .await
            .with_context(|| format!("Name tag save failed for slot {slot}"))?;
        decode(resp, "name tag save").await
    }

    pub async fn refresh_nametags(&self, target: SlotTarget) -> Result<RefreshResponse> {
        let resp = self
            .http
            .put(self.url("/api/nametag-data"))
            .query(&[("id", target.as_query())])
            .send()
            .await
            .context("Name tag refresh failed")?;
        decode(resp, "name tag refresh").await
    }
}

/// Decode a JSON body, turning a non-success status into an error that
/// carries the relay's own message.
async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Relay {what} returned {status}: {body}");
    }
    let value = resp
        .json()
        .await
        .with_context(|| format!("Failed to parse relay {what} response"))?;
    debug!(what, "Relay response decoded");
    Ok(value)
}
