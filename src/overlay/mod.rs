//! Overlay documents.
//!
//! The rendering side of the system, minus the DOM: a ticker tape feed and
//! header/name-tag pollers. Each document owns its state and publishes what
//! it would display through a watch channel.

pub mod client;
pub mod poller;
pub mod ticker;

use anyhow::Result;
use async_trait::async_trait;

use crate::market::TickerResolver;
use crate::types::TickerPayload;

pub use client::RelayClient;
pub use poller::{DocumentState, HeaderFeed, NameTagFeed, OverlayDocument, RefreshMarker, SnapshotSource};
pub use ticker::{
    CustomLogos, LogoChoice, LogoState, TapeView, TickerFeed, TickerInputs, TickerItem, DEFAULT_SPEED,
};

/// Anything that can quote a lookup symbol for the tape.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<TickerPayload>;
}

#[async_trait]
impl QuoteSource for RelayClient {
    async fn quote(&self, symbol: &str) -> Result<TickerPayload> {
        self.ticker(symbol).await
    }
}

/// In-process quoting, for a tape running next to the resolver.
#[async_trait]
impl QuoteSource for TickerResolver {
    async fn quote(&self, symbol: &str) -> Result<TickerPayload> {
        Ok(self.resolve(symbol).await)
    }
}
