//! Logo URL resolution.
//!
//! Crypto logos are a static lookup. Equity logos walk an ordered chain of
//! sources and take the first non-empty candidate. Nothing here checks
//! that a URL actually serves an image; overlays handle load failures.

use secrecy::{ExposeSecret, SecretString};

use super::AssetClass;
use crate::config::UpstreamConfig;

/// Fixed Bitcoin logo.
pub const BITCOIN_LOGO_URL: &str = "https://assets.coingecko.com/coins/images/1/large/bitcoin.png";

/// One way of turning a ticker into a logo URL.
#[derive(Debug)]
pub enum LogoSource {
    /// logo.dev ticker lookup. Yields nothing without a token.
    LogoDev {
        base_url: String,
        token: Option<SecretString>,
    },
    /// Static URL convention with a `{ticker}` placeholder.
    Template(String),
}

impl LogoSource {
    /// The candidate URL for `ticker`, if this source can produce one.
    pub fn candidate(&self, ticker: &str) -> Option<String> {
        let encoded = urlencoding::encode(ticker);
        let url = match self {
            LogoSource::LogoDev { base_url, token } => {
                let token = token.as_ref()?.expose_secret();
                if token.is_empty() {
                    return None;
                }
                format!(
                    "{}/ticker/{encoded}?token={token}&size=40&format=png",
                    base_url.trim_end_matches('/')
                )
            }
            LogoSource::Template(template) => template.replace("{ticker}", &encoded),
        };
        (!url.is_empty()).then_some(url)
    }
}

/// Ordered equity logo chain plus the crypto lookup.
#[derive(Debug)]
pub struct LogoResolver {
    sources: Vec<LogoSource>,
}

impl LogoResolver {
    pub fn new(sources: Vec<LogoSource>) -> Self {
        Self { sources }
    }

    /// logo.dev first, then the configured static conventions.
    pub fn from_config(cfg: &UpstreamConfig, token: Option<SecretString>) -> Self {
        let mut sources = vec![LogoSource::LogoDev {
            base_url: cfg.logo_dev_base_url.clone(),
            token,
        }];
        sources.extend(cfg.logo_templates.iter().cloned().map(LogoSource::Template));
        Self::new(sources)
    }

    /// Resolve the logo for a lookup symbol of the given class.
    pub fn resolve(&self, class: &AssetClass, ticker: &str) -> Option<String> {
        match class {
            AssetClass::Crypto { .. } => crypto_logo(ticker).map(str::to_string),
            AssetClass::Equity => self.sources.iter().find_map(|s| s.candidate(ticker)),
        }
    }
}

/// Static crypto logo table. Only Bitcoin is known.
pub fn crypto_logo(ticker: &str) -> Option<&'static str> {
    (ticker == "BTC").then_some(BITCOIN_LOGO_URL)
}
