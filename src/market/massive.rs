//! Massive equity/ETF prices.
//!
//! - Last trade: `GET {base}/v2/last/trade/{ticker}?apiKey=…` → `results.p`
//! - Previous day: `GET {base}/v2/aggs/ticker/{ticker}/prev?apiKey=…` → `results[0].c`
//! - Overview: `GET {base}/v3/reference/tickers/{ticker}?apiKey=…` → name,
//!   last quote and branding
//!
//! A non-success status means "no data" rather than an error, so one bad
//! symbol degrades to a zero price instead of failing the request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{EquityOverview, EquityPriceSource};

#[derive(Debug, Deserialize)]
struct LastTradeResponse {
    #[serde(default)]
    results: Option<LastTrade>,
}

#[derive(Debug, Deserialize)]
struct LastTrade {
    #[serde(default)]
    p: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PrevAggResponse {
    #[serde(default)]
    results: Vec<PrevAgg>,
}

#[derive(Debug, Deserialize)]
struct PrevAgg {
    #[serde(default)]
    c: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    #[serde(default)]
    results: Option<OverviewResults>,
}

#[derive(Debug, Default, Deserialize)]
struct OverviewResults {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    market: Option<OverviewMarket>,
    #[serde(default)]
    branding: Option<Branding>,
}

#[derive(Debug, Deserialize)]
struct OverviewMarket {
    #[serde(default)]
    last_quote: Option<LastQuote>,
}

#[derive(Debug, Deserialize)]
struct LastQuote {
    #[serde(default)]
    last: Option<QuotePrice>,
}

#[derive(Debug, Deserialize)]
struct QuotePrice {
    #[serde(default)]
    price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct Branding {
    #[serde(default)]
    logo_url: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
}

impl From<OverviewResults> for EquityOverview {
    fn from(r: OverviewResults) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        let last_quote = r
            .market
            .and_then(|m| m.last_quote)
            .and_then(|q| q.last)
            .and_then(|p| p.price)
            .filter(|p| !p.is_zero());
        let logo_url = r
            .branding
            .and_then(|b| non_empty(b.logo_url).or(non_empty(b.icon_url)));
        Self {
            name: non_empty(r.name),
            last_quote,
            logo_url,
        }
    }
}

pub struct MassiveClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl MassiveClient {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("obs-overlay/0.1.0")
            .build()
            .context("Failed to build Massive HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// GET `path` and decode JSON. `Ok(None)` on a non-success status.
    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, ticker: &str) -> Result<Option<T>> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("apiKey", self.api_key.expose_secret().as_str())])
            .send()
            .await
            .with_context(|| format!("Massive request failed for {ticker}"))?;

        if !resp.status().is_success() {
            warn!(ticker, path, status = %resp.status(), "Massive returned an error status");
            return Ok(None);
        }

        let body = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Massive response for {ticker}"))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl EquityPriceSource for MassiveClient {
    async fn last_trade(&self, ticker: &str) -> Result<Option<Decimal>> {
        let path = format!("/v2/last/trade/{}", urlencoding::encode(ticker));
        let resp: Option<LastTradeResponse> = self.get_json(&path, ticker).await?;
        let price = resp
            .and_then(|r| r.results)
            .and_then(|t| t.p)
            .filter(|p| !p.is_zero());
        debug!(ticker, price = ?price, "Last trade fetched");
        Ok(price)
    }

    async fn previous_close(&self, ticker: &str) -> Result<Option<Decimal>> {
        let path = format!("/v2/aggs/ticker/{}/prev", urlencoding::encode(ticker));
        let resp: Option<PrevAggResponse> = self.get_json(&path, ticker).await?;
        let close = resp
            .and_then(|r| r.results.into_iter().next())
            .and_then(|a| a.c)
            .filter(|c| !c.is_zero());
        debug!(ticker, close = ?close, "Previous close fetched");
        Ok(close)
    }

    async fn overview(&self, ticker: &str) -> Result<Option<EquityOverview>> {
        let path = format!("/v3/reference/tickers/{}", urlencoding::encode(ticker));
        let resp: Option<OverviewResponse> = self.get_json(&path, ticker).await?;
        let overview = resp.and_then(|r| r.results).map(EquityOverview::from);
        debug!(ticker, name = ?overview.as_ref().and_then(|o| o.name.as_deref()), "Ticker overview fetched");
        Ok(overview)
    }
}
