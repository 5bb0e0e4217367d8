//! CoinGecko crypto spot prices.
//!
//! API: `GET {base}/simple/price?ids=<id>&vs_currencies=usd&include_24hr_change=true`
//! Auth: None required.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CryptoPriceSource, CryptoSpot};

#[derive(Debug, Deserialize)]
struct SimplePrice {
    #[serde(default)]
    usd: Option<Decimal>,
    #[serde(default)]
    usd_24h_change: Option<Decimal>,
}

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("obs-overlay/0.1.0")
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CryptoPriceSource for CoinGeckoClient {
    async fn spot(&self, coin_id: &str) -> Result<Option<CryptoSpot>> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true",
            self.base_url,
            urlencoding::encode(coin_id)
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("CoinGecko request failed for {coin_id}"))?;

        if !resp.status().is_success() {
            warn!(coin_id, status = %resp.status(), "CoinGecko returned an error status");
            return Ok(None);
        }

        let mut data: HashMap<String, SimplePrice> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse CoinGecko response for {coin_id}"))?;

        let spot = data.remove(coin_id).and_then(|p| {
            p.usd.map(|price| CryptoSpot {
                price,
                change_24h_pct: p.usd_24h_change.unwrap_or_default(),
            })
        });
        debug!(coin_id, found = spot.is_some(), "CoinGecko spot fetched");
        Ok(spot)
    }
}
