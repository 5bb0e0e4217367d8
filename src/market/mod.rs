//! Ticker price and logo resolution.
//!
//! Symbols are classified as crypto or equity, priced through the matching
//! upstream source, and decorated with a logo URL. Upstream trouble never
//! escapes [`TickerResolver::resolve`]: it degrades to a zeroed
//! [`TickerFallback`] so one bad symbol cannot blank the tape.

pub mod coingecko;
pub mod logos;
pub mod massive;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::UpstreamConfig;
use crate::types::{TickerFallback, TickerPayload, TickerQuote};

pub use coingecko::CoinGeckoClient;
pub use logos::{LogoResolver, LogoSource};
pub use massive::MassiveClient;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How a symbol is priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetClass {
    Crypto { coin_id: String },
    Equity,
}

/// Strip whitespace and a leading `$` display prefix.
pub fn lookup_symbol(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('$').unwrap_or(trimmed).trim()
}

/// Classify a lookup symbol. `BTC` and anything prefixed `X:` are crypto.
pub fn classify(symbol: &str) -> AssetClass {
    if symbol == "BTC" {
        return AssetClass::Crypto {
            coin_id: "bitcoin".to_string(),
        };
    }
    match symbol.strip_prefix("X:") {
        Some(pair) => AssetClass::Crypto {
            coin_id: coin_id_for(pair),
        },
        None => AssetClass::Equity,
    }
}

fn coin_id_for(pair: &str) -> String {
    match pair.to_ascii_uppercase().as_str() {
        "BTCUSD" => "bitcoin".to_string(),
        "ETHUSD" => "ethereum".to_string(),
        "SOLUSD" => "solana".to_string(),
        other => other
            .strip_suffix("USD")
            .unwrap_or(other)
            .to_ascii_lowercase(),
    }
}

/// `(current - previous) / previous * 100`, or zero without a baseline.
pub fn percent_change(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ZERO;
    }
    (current - previous)
        .checked_div(previous)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Upstream seams
// ---------------------------------------------------------------------------

/// Crypto spot price with its 24h move in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoSpot {
    pub price: Decimal,
    pub change_24h_pct: Decimal,
}

/// Crypto spot price source. `Ok(None)` means the source had no data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CryptoPriceSource: Send + Sync {
    async fn spot(&self, coin_id: &str) -> Result<Option<CryptoSpot>>;
}

/// Reference data for an equity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquityOverview {
    pub name: Option<String>,
    /// Last quoted price, used when there is no last trade.
    pub last_quote: Option<Decimal>,
    pub logo_url: Option<String>,
}

/// Equity/ETF price source. `Ok(None)` means the source had no data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EquityPriceSource: Send + Sync {
    async fn last_trade(&self, ticker: &str) -> Result<Option<Decimal>>;
    async fn previous_close(&self, ticker: &str) -> Result<Option<Decimal>>;
    async fn overview(&self, ticker: &str) -> Result<Option<EquityOverview>>;
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct TickerResolver {
    crypto: Arc<dyn CryptoPriceSource>,
    /// `None` when no equity API key is configured.
    equity: Option<Arc<dyn EquityPriceSource>>,
    logos: LogoResolver,
    clock: Arc<dyn Clock>,
}

impl TickerResolver {
    pub fn new(
        crypto: Arc<dyn CryptoPriceSource>,
        equity: Option<Arc<dyn EquityPriceSource>>,
        logos: LogoResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            crypto,
            equity,
            logos,
            clock,
        }
    }

    /// Build the reqwest-backed resolver. Secrets come from the environment.
    pub fn from_config(cfg: &UpstreamConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let timeout = cfg.request_timeout();
        let crypto = Arc::new(CoinGeckoClient::new(&cfg.coingecko_base_url, timeout)?);
        let equity = match cfg.massive_api_key() {
            Some(key) => Some(Arc::new(MassiveClient::new(&cfg.massive_base_url, key, timeout)?)
                as Arc<dyn EquityPriceSource>),
            None => {
                warn!(env = %cfg.massive_api_key_env, "Equity API key not set; ticker endpoint disabled");
                None
            }
        };
        let logos = LogoResolver::from_config(cfg, cfg.logo_api_key());
        Ok(Self::new(crypto, equity, logos, clock))
    }

    /// Whether the equity credential is present.
    pub fn is_configured(&self) -> bool {
        self.equity.is_some()
    }

    /// Resolve a symbol to a quote, or to a zeroed fallback on failure.
    pub async fn resolve(&self, raw: &str) -> TickerPayload {
        let symbol = lookup_symbol(raw);
        let class = classify(symbol);
        let logo = self.logos.resolve(&class, symbol);

        let result = match &class {
            AssetClass::Crypto { coin_id } => self.crypto_quote(symbol, coin_id, logo.clone()).await,
            AssetClass::Equity => self.equity_quote(symbol, logo.clone()).await,
        };

        match result {
            Ok(quote) => {
                debug!(ticker = %symbol, price = %quote.price, "Ticker resolved");
                TickerPayload::Quote(quote)
            }
            Err(e) => {
                warn!(ticker = %symbol, error = %e, "Ticker lookup failed; returning fallback");
                TickerPayload::Fallback(TickerFallback::zeroed(symbol, logo, format!("{e:#}")))
            }
        }
    }

    async fn crypto_quote(&self, symbol: &str, coin_id: &str, logo: Option<String>) -> Result<TickerQuote> {
        let spot = self
            .crypto
            .spot(coin_id)
            .await?
            .ok_or_else(|| anyhow!("No price data for {symbol}"))?;
        let change = spot
            .price
            .checked_mul(spot.change_24h_pct)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| anyhow!("Price change out of range for {symbol}"))?;
        let name = if symbol == "BTC" { "Bitcoin" } else { symbol };
        Ok(TickerQuote {
            ticker: symbol.to_string(),
            price: spot.price,
            change,
            percent_change: spot.change_24h_pct,
            logo_url: logo,
            name: name.to_string(),
            last_updated: self.clock.now(),
        })
    }

    async fn equity_quote(&self, symbol: &str, logo: Option<String>) -> Result<TickerQuote> {
        let equity = self
            .equity
            .as_ref()
            .ok_or_else(|| anyhow!("API key not configured"))?;

        let (last, prev, overview) = tokio::join!(
            equity.last_trade(symbol),
            equity.previous_close(symbol),
            equity.overview(symbol)
        );
        let overview = overview
            .unwrap_or_else(|e| {
                warn!(ticker = %symbol, error = %e, "Ticker overview unavailable");
                None
            })
            .unwrap_or_default();

        let price = last?
            .or(overview.last_quote)
            .ok_or_else(|| anyhow!("No price data for {symbol}"))?;
        let prev_close = prev?.unwrap_or(price);
        let change = price
            .checked_sub(prev_close)
            .ok_or_else(|| anyhow!("Price change out of range for {symbol}"))?;

        Ok(TickerQuote {
            ticker: symbol.to_string(),
            price,
            change,
            percent_change: percent_change(price, prev_close),
            logo_url: logo.or(overview.logo_url),
            name: overview.name.unwrap_or_else(|| symbol.to_string()),
            last_updated: self.clock.now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
