//! End-to-end scenarios against a live relay.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use obs_overlay::api::{self, RelayState};
use obs_overlay::clock::{Clock, SystemClock};
use obs_overlay::config::RoomConfig;
use obs_overlay::overlay::{
    HeaderFeed, NameTagFeed, OverlayDocument, QuoteSource, RelayClient, TickerFeed,
};
use obs_overlay::overlay::DEFAULT_SPEED;
use obs_overlay::panel::{ControlPanel, SettingsBundle};
use obs_overlay::state::OverlayState;
use obs_overlay::storage::{JsonFileBackend, KvBackend, MemoryBackend};
use obs_overlay::sync::{MemoryStore, Store};
use obs_overlay::types::{NameTag, Slot, SlotTarget, TickerPayload};

use crate::mock_quotes::{self, MockQuotes, BROKEN, UNKNOWN};

struct Relay {
    client: Arc<RelayClient>,
    quotes: Arc<MockQuotes>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Relay {
    async fn start(backend: Arc<dyn KvBackend>, equity_configured: bool) -> Self {
        let quotes = Arc::new(MockQuotes::default());
        let overlay = OverlayState::new(backend, Arc::new(SystemClock));
        let state = Arc::new(RelayState::new(
            overlay,
            mock_quotes::resolver(quotes.clone(), equity_configured),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(api::serve(listener, state, async move {
            let _ = rx.await;
        }));

        let client = RelayClient::new(format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        Self {
            client: Arc::new(client),
            quotes,
            stop: Some(stop),
            handle,
        }
    }

    async fn in_memory() -> Self {
        Self::start(Arc::new(MemoryBackend::new()), true).await
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }

    fn panel(&self) -> ControlPanel {
        let room = RoomConfig::default();
        ControlPanel::new(
            SettingsBundle::in_memory(&room, DEFAULT_SPEED),
            Some(self.client.clone()),
            room,
            Arc::new(SystemClock),
        )
    }
}

/// Waits until the display holds a snapshot matching `pred`.
async fn shows<T>(
    display: &mut tokio::sync::watch::Receiver<Option<T>>,
    pred: impl FnMut(&Option<T>) -> bool,
) -> bool {
    tokio::time::timeout(Duration::from_secs(2), display.wait_for(pred))
        .await
        .is_ok_and(|r| r.is_ok())
}

fn temp_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("obs_overlay_it_{}.json", uuid::Uuid::new_v4()))
}

// ---------------------------------------------------------------------------
// Header and name tags
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_defaults_before_any_save() {
    let relay = Relay::in_memory().await;

    let header = relay.client.header().await.unwrap();
    assert_eq!(header.text, "TRUE NORTH");
    assert_eq!(header.timestamp, 0);

    let tag = relay.client.nametag(Slot::new(5).unwrap()).await.unwrap();
    assert!(tag.is_default);
    assert_eq!(tag.tag.name, "Name");
    assert_eq!(tag.tag.subtext, "Subtext");

    relay.shutdown().await;
}

#[tokio::test]
async fn test_panel_load_syncs_relay() {
    let relay = Relay::in_memory().await;
    let panel = relay.panel();
    panel.load().await.unwrap();

    let header = relay.client.header().await.unwrap();
    assert_eq!(header.text, "TRUE NORTH");
    assert!(header.timestamp > 0);

    // Fresh panel tags have blank names; the relay copy shows the default.
    let host = relay.client.nametag(Slot::new(0).unwrap()).await.unwrap();
    assert!(!host.is_default);
    assert_eq!(host.tag.name, "Name");
    assert_eq!(host.tag.subtext, "Host");
    assert_eq!(
        host.tag.human_link,
        "https://vdo.ninja/?room=TrueNorth1&push=CAM_A&label=Host"
    );
    assert_eq!(
        host.tag.obs_screenshare_link,
        "https://vdo.ninja/?view=CAM_A:s&solo&room=TrueNorth1"
    );

    relay.shutdown().await;
}

#[tokio::test]
async fn test_refresh_all_visible_on_every_slot() {
    let relay = Relay::in_memory().await;
    let resp = relay.client.refresh_nametags(SlotTarget::All).await.unwrap();
    assert_eq!(resp.message.as_deref(), Some("All name tags refreshed"));

    for slot in Slot::all() {
        let view = relay.client.nametag(slot).await.unwrap();
        assert_eq!(view.refresh_timestamp, resp.refresh_timestamp);
        let age = SystemClock.now_millis() - view.refresh_timestamp;
        assert!((0..1000).contains(&age), "slot {slot} stamp is {age}ms old");
    }

    relay.shutdown().await;
}

#[tokio::test]
async fn test_nametag_document_follows_saves_and_refreshes() {
    let relay = Relay::in_memory().await;
    let panel = relay.panel();
    let slot = Slot::new(2).unwrap();

    let mut doc = OverlayDocument::new(NameTagFeed::new(relay.client.clone(), slot));
    let display = doc.subscribe();
    assert!(doc.poll_once().await.unwrap());
    assert!(display.borrow().as_ref().unwrap().is_default);

    // Nothing changed: no re-adopt.
    assert!(!doc.poll_once().await.unwrap());

    let tag = NameTag {
        name: "Grace Hopper".into(),
        ..panel.nametags()[2].clone()
    };
    panel.save_nametag(2, tag).await.unwrap();
    assert!(doc.poll_once().await.unwrap());
    assert_eq!(display.borrow().as_ref().unwrap().tag.name, "Grace Hopper");

    // A refresh with no content change still triggers a re-adopt.
    panel.refresh_nametag(slot).await.unwrap();
    assert!(doc.poll_once().await.unwrap());

    relay.shutdown().await;
}

#[tokio::test]
async fn test_header_document_and_refresh_all() {
    let relay = Relay::in_memory().await;
    let panel = relay.panel();

    let mut doc = OverlayDocument::new(HeaderFeed::new(relay.client.clone()));
    let display = doc.subscribe();
    doc.poll_once().await.unwrap();

    panel.save_header("MARKET CLOSE").await.unwrap();
    assert!(doc.poll_once().await.unwrap());
    assert_eq!(display.borrow().as_ref().unwrap().text, "MARKET CLOSE");

    let (tags, header) = panel.refresh_all().await.unwrap();
    assert!(tags.success && header.success);
    assert_eq!(header.message.as_deref(), Some("Header refreshed"));
    assert!(doc.poll_once().await.unwrap());

    relay.shutdown().await;
}

#[tokio::test]
async fn test_blank_header_reaches_relay_as_default() {
    let relay = Relay::in_memory().await;
    let panel = relay.panel();

    panel.save_header("MARKET CLOSE").await.unwrap();
    panel.save_header("   ").await.unwrap();
    assert_eq!(relay.client.header().await.unwrap().text, "TRUE NORTH");

    relay.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_local_signal_reloads_after_relay_push() {
    let relay = Relay::in_memory().await;
    let panel = relay.panel();

    let doc = OverlayDocument::new(HeaderFeed::new(relay.client.clone()));
    let mut display = doc.subscribe();
    let task = tokio::spawn(doc.run(
        Duration::from_secs(3600),
        Some(panel.settings().header.subscribe()),
    ));
    assert!(shows(&mut display, |v| v.is_some()).await);

    // The hourly poll never fires again, so only the local signal can
    // bring each save onto the display.
    for i in 0..5 {
        let text = format!("T{i}");
        panel.save_header(&text).await.unwrap();
        assert!(
            shows(&mut display, |v| v.as_ref().is_some_and(|h| h.text == text)).await,
            "header document never showed {text}"
        );
    }

    task.abort();
    relay.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nametag_stamp_reloads_after_relay_push() {
    let relay = Relay::in_memory().await;
    let panel = relay.panel();
    let slot = Slot::new(4).unwrap();

    let doc = OverlayDocument::new(NameTagFeed::new(relay.client.clone(), slot));
    let mut display = doc.subscribe();
    let task = tokio::spawn(doc.run(
        Duration::from_secs(3600),
        Some(panel.settings().nametags_stamp.subscribe()),
    ));
    assert!(shows(&mut display, |v| v.is_some()).await);

    for i in 0..5 {
        let name = format!("Guest {i}");
        let tag = NameTag {
            name: name.clone(),
            ..panel.nametags()[4].clone()
        };
        panel.save_nametag(4, tag).await.unwrap();
        assert!(
            shows(&mut display, |v| v.as_ref().is_some_and(|t| t.tag.name == name)).await,
            "name tag document never showed {name}"
        );
    }

    task.abort();
    relay.shutdown().await;
}

#[tokio::test]
async fn test_header_survives_restart_on_json_backend() {
    let path = temp_path();

    let backend = Arc::new(JsonFileBackend::open(&path).await.unwrap());
    let relay = Relay::start(backend, true).await;
    relay.client.save_header("PERSISTED").await.unwrap();
    relay.shutdown().await;

    let backend = Arc::new(JsonFileBackend::open(&path).await.unwrap());
    let relay = Relay::start(backend, true).await;
    assert_eq!(relay.client.header().await.unwrap().text, "PERSISTED");
    relay.shutdown().await;

    let _ = std::fs::remove_file(&path);
}

// ---------------------------------------------------------------------------
// Tickers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tape_renders_every_symbol() {
    let relay = Relay::in_memory().await;
    let inputs = obs_overlay::overlay::TickerInputs {
        tickers: Arc::new(MemoryStore::new(vec![
            "$MSTR".to_string(),
            "BTC".to_string(),
            "$SPY".to_string(),
            format!("${BROKEN}"),
        ])),
        custom_logos: Arc::new(MemoryStore::new(Default::default())),
        speed: Arc::new(MemoryStore::new(50)),
    };

    let feed = TickerFeed::new(relay.client.clone(), inputs);
    let view = feed.refresh().await;
    assert_eq!(view.items.len(), 4);

    let mstr = &view.items[0];
    assert_eq!(mstr.symbol, "$MSTR");
    assert_eq!(mstr.price, "330.00");
    assert_eq!(mstr.change_label(), "+30.00 (+10.00%)");
    assert_eq!(mstr.logo.primary.as_deref(), Some("https://logos.test/MSTR.png"));

    match relay.client.ticker("$MSTR").await.unwrap() {
        TickerPayload::Quote(q) => assert_eq!(q.name, "Strategy Inc"),
        other => panic!("expected a quote, got {other:?}"),
    }

    assert_eq!(view.items[1].price, "64,000.00");
    assert_eq!(view.items[3].price, "0.00");

    relay.shutdown().await;
}

#[tokio::test]
async fn test_ticker_fallback_over_http() {
    let relay = Relay::in_memory().await;

    let payload = relay.client.ticker(UNKNOWN).await.unwrap();
    assert!(payload.is_fallback());
    assert_eq!(payload.logo_url(), Some("https://logos.test/UNKNOWN.png"));

    let payload = relay.client.quote("X:ETHUSD").await.unwrap();
    assert!(payload.is_fallback());
    assert!(relay.quotes.calls() >= 3);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_ticker_without_credential_is_500() {
    let relay = Relay::start(Arc::new(MemoryBackend::new()), false).await;
    let err = relay.client.ticker("SPY").await.unwrap_err();
    assert!(err.to_string().contains("500"));
    assert!(err.to_string().contains("API key not configured"));
    relay.shutdown().await;
}

#[test]
fn test_store_notifies_without_a_runtime_loop() {
    let store = MemoryStore::new(vec!["$SPY".to_string()]);
    let rx = store.subscribe();
    tokio_test::block_on(store.set(vec!["$QQQ".to_string()])).unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(store.get(), vec!["$QQQ".to_string()]);
}
