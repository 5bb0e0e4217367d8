//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub overlay: OverlayConfig,
    pub room: RoomConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Upstream price and logo sources.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Env var holding the equity price API key. Required by the ticker endpoint.
    pub massive_api_key_env: String,
    /// Env var holding the logo.dev token. Optional.
    pub logo_api_key_env: String,
    pub massive_base_url: String,
    pub coingecko_base_url: String,
    pub logo_dev_base_url: String,
    /// Static logo URL conventions tried after logo.dev, in order.
    /// `{ticker}` is replaced with the symbol.
    pub logo_templates: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            massive_api_key_env: "MASSIVE_API_KEY".to_string(),
            logo_api_key_env: "LOGO_API_KEY".to_string(),
            massive_base_url: "https://api.massive.com".to_string(),
            coingecko_base_url: "https://api.coingecko.com/api/v3".to_string(),
            logo_dev_base_url: "https://img.logo.dev".to_string(),
            logo_templates: vec![
                "https://assets.parqet.com/logos/symbol/{ticker}.png".to_string(),
                "https://logo.synthfinance.com/{ticker}/icon".to_string(),
            ],
            request_timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The equity price API key, if set.
    pub fn massive_api_key(&self) -> Option<SecretString> {
        AppConfig::resolve_secret(&self.massive_api_key_env)
    }

    /// The logo.dev token, if set.
    pub fn logo_api_key(&self) -> Option<SecretString> {
        AppConfig::resolve_secret(&self.logo_api_key_env)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Json,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// File path (json) or database URL/path (sqlite).
    pub path: Option<String>,
    /// Clear all name tags when the relay starts.
    pub reset_on_start: bool,
}

impl StorageConfig {
    pub fn path_or_default(&self) -> &str {
        match (&self.path, self.backend) {
            (Some(p), _) => p,
            (None, BackendKind::Sqlite) => "obs_overlay.db",
            (None, _) => "obs_overlay_state.json",
        }
    }
}

/// Overlay document timing and presentation defaults.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OverlayConfig {
    /// Base URL of the relay, used by remote overlays and the control panel.
    pub relay_url: String,
    pub ticker_refresh_secs: u64,
    pub speed_poll_millis: u64,
    pub snapshot_poll_secs: u64,
    /// Ticker scroll speed in pixels per second.
    pub default_speed: u32,
    /// Directory holding `<SYMBOL>.png` logo overrides, relative to the overlay page.
    pub local_logo_dir: Option<String>,
    /// Run the control panel and headless overlay documents alongside the
    /// relay, logging what each would display.
    pub preview: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://localhost:3000/".to_string(),
            ticker_refresh_secs: 60,
            speed_poll_millis: 500,
            snapshot_poll_secs: 5,
            default_speed: 50,
            local_logo_dir: Some("../logos".to_string()),
            preview: false,
        }
    }
}

impl OverlayConfig {
    pub fn ticker_refresh(&self) -> Duration {
        Duration::from_secs(self.ticker_refresh_secs.max(1))
    }

    pub fn speed_poll(&self) -> Duration {
        Duration::from_millis(self.speed_poll_millis.max(1))
    }

    pub fn snapshot_poll(&self) -> Duration {
        Duration::from_secs(self.snapshot_poll_secs.max(1))
    }
}

/// Video-room settings used to pre-fill camera links.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoomConfig {
    pub name: String,
    pub base_url: String,
    /// One label per camera slot, in slot order.
    pub labels: Vec<String>,
    /// Slots that also get a screenshare view link.
    pub screenshare_slots: Vec<u8>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "TrueNorth1".to_string(),
            base_url: "https://vdo.ninja/".to_string(),
            labels: ["Host", "CoHost", "Guest2", "Guest3", "Guest4", "Guest5"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            screenshare_slots: vec![0],
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a secret by env-var name. Unset or blank values are `None`.
    pub fn resolve_secret(env_name: &str) -> Option<SecretString> {
        Self::resolve_env(env_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
    }
}
