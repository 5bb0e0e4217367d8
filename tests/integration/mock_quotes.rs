//! Deterministic upstream price sources for integration testing.
//!
//! Prices are fixed per symbol; a handful of symbols are wired to fail
//! so the fallback paths can be exercised end to end.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use obs_overlay::clock::SystemClock;
use obs_overlay::market::{
    CryptoPriceSource, CryptoSpot, EquityOverview, EquityPriceSource, LogoResolver, LogoSource,
    TickerResolver,
};

/// Symbol whose upstream request errors out.
pub const BROKEN: &str = "BROKEN";
/// Symbol the upstream has never heard of.
pub const UNKNOWN: &str = "UNKNOWN";

#[derive(Default)]
pub struct MockQuotes {
    calls: AtomicUsize,
}

impl MockQuotes {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CryptoPriceSource for MockQuotes {
    async fn spot(&self, coin_id: &str) -> Result<Option<CryptoSpot>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match coin_id {
            "bitcoin" => Some(CryptoSpot {
                price: dec!(64000),
                change_24h_pct: dec!(2.5),
            }),
            _ => None,
        })
    }
}

#[async_trait]
impl EquityPriceSource for MockQuotes {
    async fn last_trade(&self, ticker: &str) -> Result<Option<Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match ticker {
            BROKEN => Err(anyhow!("upstream connection reset")),
            UNKNOWN => Ok(None),
            "MSTR" => Ok(Some(dec!(330))),
            _ => Ok(Some(dec!(101))),
        }
    }

    async fn previous_close(&self, ticker: &str) -> Result<Option<Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match ticker {
            "MSTR" => Ok(Some(dec!(300))),
            _ => Ok(Some(dec!(100))),
        }
    }

    async fn overview(&self, ticker: &str) -> Result<Option<EquityOverview>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match ticker {
            "MSTR" => Some(EquityOverview {
                name: Some("Strategy Inc".to_string()),
                ..EquityOverview::default()
            }),
            _ => None,
        })
    }
}

/// Resolver over `MockQuotes` with a static logo convention.
pub fn resolver(quotes: Arc<MockQuotes>, equity_configured: bool) -> TickerResolver {
    let equity = equity_configured.then(|| quotes.clone() as Arc<dyn EquityPriceSource>);
    TickerResolver::new(
        quotes,
        equity,
        LogoResolver::new(vec![LogoSource::Template(
            "https://logos.test/{ticker}.png".to_string(),
        )]),
        Arc::new(SystemClock),
    )
}
