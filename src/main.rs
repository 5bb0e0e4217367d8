//! obs-overlay relay
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! the storage backend, and serves the overlay endpoints until Ctrl+C.
//! With `overlay.preview` set, the control panel and headless overlay
//! documents run in the same process against the relay.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use obs_overlay::api::{self, RelayState};
use obs_overlay::clock::{Clock, SystemClock};
use obs_overlay::config::AppConfig;
use obs_overlay::market::TickerResolver;
use obs_overlay::overlay::{HeaderFeed, LogoState, NameTagFeed, OverlayDocument, RelayClient, TickerFeed};
use obs_overlay::panel::{ControlPanel, OverlayUrls, SettingsBundle};
use obs_overlay::state::OverlayState;
use obs_overlay::storage::{self, KvBackend};
use obs_overlay::sync::Store;
use obs_overlay::types::Slot;

const BANNER: &str = r#"
  ___  ____ ____     ___                 _
 / _ \| __ ) ___|   / _ \__   _____ _ __| | __ _ _   _
| | | |  _ \___ \  | | | \ \ / / _ \ '__| |/ _` | | | |
| |_| | |_) |__) | | |_| |\ V /  __/ |  | | (_| | |_| |
 \___/|____/____/   \___/  \_/ \___|_|  |_|\__,_|\__, |
                                                 |___/
  Ticker / header / name-tag relay  v0.1.0
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path =
        std::env::var("OBS_OVERLAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found; using defaults");
        AppConfig::default()
    };

    println!("{BANNER}");
    info!(
        host = %cfg.server.host,
        port = cfg.server.port,
        storage = ?cfg.storage.backend,
        room = %cfg.room.name,
        "obs-overlay relay starting up"
    );

    // -- Components ------------------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = storage::open_backend(&cfg.storage).await?;
    let overlay = OverlayState::new(backend.clone(), clock.clone());
    if cfg.storage.reset_on_start {
        overlay.reset_nametags().await?;
        info!("Name tags reset on start");
    }

    let resolver = TickerResolver::from_config(&cfg.upstream, clock.clone())?;
    let state = Arc::new(RelayState::new(overlay, resolver));

    // -- Serve -----------------------------------------------------------

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let server = tokio::spawn(api::serve(listener, state, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    }));

    if cfg.overlay.preview {
        start_preview(&cfg, backend, clock).await?;
    }

    server.await.context("Relay task panicked")?
}

/// Rendered width of one tape item, used for the logged scroll cycle.
const NOMINAL_ITEM_WIDTH_PX: f64 = 240.0;

/// Load the control panel, push its state to the relay, and spawn the
/// overlay documents with their displays logged.
async fn start_preview(cfg: &AppConfig, backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Result<()> {
    let relay = Arc::new(RelayClient::new(
        cfg.overlay.relay_url.as_str(),
        cfg.upstream.request_timeout(),
    )?);
    let settings = SettingsBundle::open(backend, &cfg.room, cfg.overlay.default_speed).await?;
    let panel = ControlPanel::new(settings.clone(), Some(relay.clone()), cfg.room.clone(), clock);
    panel.load().await?;

    let urls = OverlayUrls::new(cfg.overlay.relay_url.as_str());
    info!(
        ticker = %urls.ticker(settings.ticker_speed.get(), None),
        header = %urls.header(),
        header_auto = %urls.header_auto(),
        "OBS browser sources"
    );
    for slot in Slot::all() {
        info!(slot = %slot, url = %urls.nametag_auto(slot), "OBS name tag source");
    }

    let tape = TickerFeed::new(relay.clone(), settings.ticker_inputs())
        .with_local_logo_dir(cfg.overlay.local_logo_dir.clone())
        .with_timers(cfg.overlay.ticker_refresh(), cfg.overlay.speed_poll())
        .with_default_speed(cfg.overlay.default_speed);
    let mut tape_rx = tape.subscribe();
    tokio::spawn(tape.run());
    tokio::spawn(async move {
        while tape_rx.changed().await.is_ok() {
            let view = tape_rx.borrow_and_update().clone();
            match &view.status {
                Some(status) => info!(%status, "Ticker tape"),
                None => {
                    info!(
                        items = view.items.len(),
                        speed = view.speed,
                        cycle_secs = view.cycle_secs(NOMINAL_ITEM_WIDTH_PX),
                        "Ticker tape"
                    );
                    for item in &view.items {
                        let fallback = LogoState::Primary.on_error(&item.logo);
                        debug!(
                            symbol = %item.symbol,
                            logo = LogoState::Primary.url(&item.logo),
                            on_error = fallback.url(&item.logo),
                            "Tape item"
                        );
                    }
                }
            }
        }
    });

    let header = OverlayDocument::new(HeaderFeed::new(relay.clone()));
    let mut header_rx = header.subscribe();
    tokio::spawn(header.run(cfg.overlay.snapshot_poll(), Some(settings.header.subscribe())));
    tokio::spawn(async move {
        while header_rx.changed().await.is_ok() {
            if let Some(view) = header_rx.borrow_and_update().clone() {
                info!(text = %view.text, "Header overlay");
            }
        }
    });

    for slot in Slot::all() {
        let doc = OverlayDocument::new(NameTagFeed::new(relay.clone(), slot));
        let mut rx = doc.subscribe();
        tokio::spawn(doc.run(
            cfg.overlay.snapshot_poll(),
            Some(settings.nametags_stamp.subscribe()),
        ));
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                if let Some(view) = rx.borrow_and_update().clone() {
                    info!(slot = %slot, tag = %view.tag, "Name tag overlay");
                }
            }
        });
    }

    info!(relay = relay.base_url(), "Preview overlays started");
    Ok(())
}

/// Initialise the tracing subscriber. JSON output when
/// `OBS_OVERLAY_LOG_JSON` is set.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("obs_overlay=info"));

    let json_logging = std::env::var("OBS_OVERLAY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
