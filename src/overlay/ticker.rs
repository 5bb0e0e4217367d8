//! Ticker tape feed.
//!
//! Reads the ticker list, custom logos, and speed from settings stores,
//! quotes every symbol concurrently, and publishes a [`TapeView`]. A symbol
//! whose quote fails still shows up, zeroed, so the tape never shrinks
//! because of one bad lookup.

use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::QuoteSource;
use crate::market::{classify, lookup_symbol, AssetClass};
use crate::sync::Store;
use crate::types::TickerPayload;

/// Built-in scroll speed in pixels per second, used when no configured
/// default is given.
pub const DEFAULT_SPEED: u32 = 50;

/// Shortest full scroll cycle, in seconds.
pub const MIN_SCROLL_SECS: f64 = 10.0;

pub const NO_TICKERS: &str = "No tickers configured";

/// Uploaded logos keyed by display symbol, as data URLs.
pub type CustomLogos = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Speed
// ---------------------------------------------------------------------------

/// Parse a speed setting the lenient way: leading digits count, anything
/// else, zero, or a negative value means `fallback`.
pub fn parse_speed(raw: &str, fallback: u32) -> u32 {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u32>() {
        Ok(speed) if speed > 0 => speed,
        _ => fallback,
    }
}

/// A URL override wins over the stored value.
pub fn effective_speed(url_override: Option<&str>, stored: u32, fallback: u32) -> u32 {
    match url_override {
        Some(raw) => parse_speed(raw, fallback),
        None if stored > 0 => stored,
        None => fallback,
    }
}

/// Seconds for one full scroll of a single copy of the items.
pub fn scroll_duration(single_set_width: f64, speed: u32) -> f64 {
    let speed = if speed == 0 { DEFAULT_SPEED } else { speed };
    (single_set_width / f64::from(speed)).max(MIN_SCROLL_SECS)
}

// ---------------------------------------------------------------------------
// Logos
// ---------------------------------------------------------------------------

/// The image to try first and the one to swap in if it fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogoChoice {
    pub primary: Option<String>,
    pub fallback: Option<String>,
}

/// Which logo an item is showing after load failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoState {
    Primary,
    Fallback,
    Hidden,
}

impl LogoState {
    /// One-step fallback, then hide.
    pub fn on_error(self, choice: &LogoChoice) -> LogoState {
        match self {
            LogoState::Primary if choice.fallback.is_some() => LogoState::Fallback,
            _ => LogoState::Hidden,
        }
    }

    pub fn url(self, choice: &LogoChoice) -> Option<&str> {
        match self {
            LogoState::Primary => choice.primary.as_deref(),
            LogoState::Fallback => choice.fallback.as_deref(),
            LogoState::Hidden => None,
        }
    }
}

/// Custom upload first, then the local logo directory, with the API logo
/// kept as the single fallback.
fn choose_logo(
    display: &str,
    custom: &CustomLogos,
    local_dir: Option<&str>,
    api_logo: Option<&str>,
) -> LogoChoice {
    let api_logo = api_logo.map(str::to_string);
    if let Some(custom) = custom.get(display) {
        return LogoChoice {
            primary: Some(custom.clone()),
            fallback: api_logo,
        };
    }
    match local_dir {
        Some(dir) => LogoChoice {
            primary: Some(format!(
                "{}/{}.png",
                dir.trim_end_matches('/'),
                lookup_symbol(display)
            )),
            fallback: api_logo,
        },
        None => LogoChoice {
            primary: api_logo,
            fallback: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerItem {
    /// Symbol as the operator typed it, `$` prefix included.
    pub symbol: String,
    pub price: String,
    pub change: String,
    pub percent: String,
    pub up: bool,
    pub logo: LogoChoice,
}

impl TickerItem {
    pub fn new(symbol: &str, price: Decimal, change: Decimal, percent: Decimal, logo: LogoChoice) -> Self {
        let crypto = matches!(classify(lookup_symbol(symbol)), AssetClass::Crypto { .. });
        let up = !change.is_sign_negative() || change.is_zero();
        let sign = if up { "+" } else { "" };
        Self {
            symbol: symbol.to_string(),
            price: if crypto {
                group_thousands(&format!("{:.2}", price.round_dp(2)))
            } else {
                format!("{:.2}", price.round_dp(2))
            },
            change: format!("{sign}{:.2}", change.round_dp(2)),
            percent: format!("{sign}{:.2}%", percent.abs().round_dp(2)),
            up,
            logo,
        }
    }

    /// Placeholder for a symbol whose quote failed outright.
    pub fn zeroed(symbol: &str, custom: &CustomLogos) -> Self {
        let logo = LogoChoice {
            primary: custom.get(symbol).cloned(),
            fallback: None,
        };
        Self::new(symbol, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, logo)
    }

    /// `+1.50 (+1.20%)` style change label.
    pub fn change_label(&self) -> String {
        format!("{} ({})", self.change, self.percent)
    }
}

/// Insert `,` every three digits of the integer part.
fn group_thousands(formatted: &str) -> String {
    let (sign, rest) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int, frac) = match rest.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (rest, None),
    };

    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// What the tape shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TapeView {
    pub items: Vec<TickerItem>,
    pub speed: u32,
    /// Status line shown instead of items, e.g. when nothing is configured.
    pub status: Option<String>,
}

impl TapeView {
    /// Seconds per scroll cycle when each item renders `item_width` pixels wide.
    pub fn cycle_secs(&self, item_width: f64) -> f64 {
        scroll_duration(self.items.len() as f64 * item_width, self.speed)
    }
}

/// Settings the tape reads.
#[derive(Clone)]
pub struct TickerInputs {
    pub tickers: Arc<dyn Store<Vec<String>>>,
    pub custom_logos: Arc<dyn Store<CustomLogos>>,
    pub speed: Arc<dyn Store<u32>>,
}

pub struct TickerFeed {
    source: Arc<dyn QuoteSource>,
    inputs: TickerInputs,
    local_logo_dir: Option<String>,
    url_speed: Option<String>,
    default_speed: u32,
    refresh_every: Duration,
    speed_poll: Duration,
    display: watch::Sender<TapeView>,
}

impl TickerFeed {
    pub fn new(source: Arc<dyn QuoteSource>, inputs: TickerInputs) -> Self {
        let (display, _rx) = watch::channel(TapeView {
            speed: DEFAULT_SPEED,
            ..TapeView::default()
        });
        Self {
            source,
            inputs,
            local_logo_dir: None,
            url_speed: None,
            default_speed: DEFAULT_SPEED,
            refresh_every: Duration::from_secs(60),
            speed_poll: Duration::from_millis(500),
            display,
        }
    }

    pub fn with_local_logo_dir(mut self, dir: Option<String>) -> Self {
        self.local_logo_dir = dir;
        self
    }

    /// Speed from the page URL; takes precedence over the stored speed.
    pub fn with_url_speed(mut self, raw: Option<String>) -> Self {
        self.url_speed = raw;
        self
    }

    /// Speed used when neither the URL nor the store holds a valid one.
    pub fn with_default_speed(mut self, speed: u32) -> Self {
        if speed > 0 {
            self.default_speed = speed;
            self.display.send_modify(|view| view.speed = speed);
        }
        self
    }

    pub fn with_timers(mut self, refresh_every: Duration, speed_poll: Duration) -> Self {
        self.refresh_every = refresh_every;
        self.speed_poll = speed_poll;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<TapeView> {
        self.display.subscribe()
    }

    pub fn speed(&self) -> u32 {
        effective_speed(
            self.url_speed.as_deref(),
            self.inputs.speed.get(),
            self.default_speed,
        )
    }

    /// Quote every configured symbol and publish the new tape.
    pub async fn refresh(&self) -> TapeView {
        let speed = self.speed();
        let symbols: Vec<String> = self
            .inputs
            .tickers
            .get()
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .collect();

        if symbols.is_empty() {
            let view = TapeView {
                items: Vec::new(),
                speed,
                status: Some(NO_TICKERS.to_string()),
            };
            self.display.send_replace(view.clone());
            return view;
        }

        let custom = self.inputs.custom_logos.get();
        let quotes = join_all(symbols.iter().map(|s| self.source.quote(lookup_symbol(s)))).await;

        let items: Vec<TickerItem> = symbols
            .iter()
            .zip(quotes)
            .map(|(symbol, quote)| match quote {
                Ok(payload) => self.item_for(symbol, &payload, &custom),
                Err(e) => {
                    warn!(ticker = %symbol, error = %e, "Quote failed; showing zeroed item");
                    TickerItem::zeroed(symbol, &custom)
                }
            })
            .collect();

        debug!(count = items.len(), "Ticker tape refreshed");
        let view = TapeView {
            items,
            speed,
            status: None,
        };
        self.display.send_replace(view.clone());
        view
    }

    fn item_for(&self, symbol: &str, payload: &TickerPayload, custom: &CustomLogos) -> TickerItem {
        let logo = choose_logo(
            symbol,
            custom,
            self.local_logo_dir.as_deref(),
            payload.logo_url(),
        );
        TickerItem::new(
            symbol,
            payload.price(),
            payload.change(),
            payload.percent_change(),
            logo,
        )
    }

    /// Republish only if the effective speed moved.
    fn poll_speed(&self) {
        let speed = self.speed();
        self.display.send_if_modified(|view| {
            if view.speed == speed {
                return false;
            }
            debug!(from = view.speed, to = speed, "Ticker speed changed");
            view.speed = speed;
            true
        });
    }

    /// Refresh on the interval and on ticker/logo changes, and poll the
    /// speed on the fast timer. Runs until the task is dropped.
    pub async fn run(self) {
        let mut refresh = interval(self.refresh_every);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut speed_poll = interval(self.speed_poll);
        speed_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tickers_rx = self.inputs.tickers.subscribe();
        let mut logos_rx = self.inputs.custom_logos.subscribe();

        info!(
            refresh_secs = self.refresh_every.as_secs(),
            speed = self.speed(),
            "Ticker tape started"
        );

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    self.refresh().await;
                }
                _ = speed_poll.tick() => self.poll_speed(),
                Ok(()) = tickers_rx.changed() => {
                    self.refresh().await;
                }
                Ok(()) = logos_rx.changed() => {
                    self.refresh().await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MemoryStore;
    use crate::types::{TickerFallback, TickerQuote};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct FakeQuotes;

    #[async_trait]
    impl QuoteSource for FakeQuotes {
        async fn quote(&self, symbol: &str) -> Result<TickerPayload> {
            match symbol {
                "BAD" => Err(anyhow!("HTTP 500")),
                "ZERO" => Ok(TickerPayload::Fallback(TickerFallback::zeroed(
                    "ZERO",
                    Some("https://logos.example/ZERO.png".into()),
                    "timeout",
                ))),
                "BTC" => Ok(TickerPayload::Quote(TickerQuote {
                    ticker: "BTC".into(),
                    price: dec!(64250.5),
                    change: dec!(-1250.25),
                    percent_change: dec!(-1.9),
                    logo_url: Some("https://logos.example/btc.png".into()),
                    name: "Bitcoin".into(),
                    last_updated: Utc::now(),
                })),
                other => Ok(TickerPayload::Quote(TickerQuote {
                    ticker: other.into(),
                    price: dec!(105),
                    change: dec!(5),
                    percent_change: dec!(5),
                    logo_url: Some(format!("https://logos.example/{other}.png")),
                    name: other.into(),
                    last_updated: Utc::now(),
                })),
            }
        }
    }

    struct Fixture {
        tickers: Arc<MemoryStore<Vec<String>>>,
        logos: Arc<MemoryStore<CustomLogos>>,
        speed: Arc<MemoryStore<u32>>,
    }

    impl Fixture {
        fn new(tickers: &[&str]) -> Self {
            Self {
                tickers: Arc::new(MemoryStore::new(tickers.iter().map(|s| s.to_string()).collect())),
                logos: Arc::new(MemoryStore::new(CustomLogos::new())),
                speed: Arc::new(MemoryStore::new(DEFAULT_SPEED)),
            }
        }

        fn inputs(&self) -> TickerInputs {
            TickerInputs {
                tickers: self.tickers.clone(),
                custom_logos: self.logos.clone(),
                speed: self.speed.clone(),
            }
        }

        fn feed(&self) -> TickerFeed {
            TickerFeed::new(Arc::new(FakeQuotes), self.inputs())
        }
    }

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed("80", DEFAULT_SPEED), 80);
        assert_eq!(parse_speed("120px", DEFAULT_SPEED), 120);
        assert_eq!(parse_speed("0", DEFAULT_SPEED), DEFAULT_SPEED);
        assert_eq!(parse_speed("fast", DEFAULT_SPEED), DEFAULT_SPEED);
        assert_eq!(parse_speed("-20", DEFAULT_SPEED), DEFAULT_SPEED);
        assert_eq!(parse_speed("", 65), 65);
    }

    #[test]
    fn test_url_speed_wins() {
        assert_eq!(effective_speed(Some("90"), 30, DEFAULT_SPEED), 90);
        assert_eq!(effective_speed(Some("junk"), 30, DEFAULT_SPEED), DEFAULT_SPEED);
        assert_eq!(effective_speed(None, 30, DEFAULT_SPEED), 30);
        assert_eq!(effective_speed(None, 0, DEFAULT_SPEED), DEFAULT_SPEED);
        assert_eq!(effective_speed(None, 0, 70), 70);
    }

    #[test]
    fn test_scroll_duration_floor() {
        assert_eq!(scroll_duration(200.0, 50), MIN_SCROLL_SECS);
        assert_eq!(scroll_duration(3000.0, 50), 60.0);
        assert_eq!(scroll_duration(3000.0, 0), 60.0);
    }

    #[test]
    fn test_cycle_secs() {
        let mut view = TapeView {
            speed: 50,
            ..TapeView::default()
        };
        assert_eq!(view.cycle_secs(200.0), MIN_SCROLL_SECS);
        view.items = vec![TickerItem::zeroed("$SPY", &CustomLogos::new()); 15];
        assert_eq!(view.cycle_secs(200.0), 60.0);
    }

    #[tokio::test]
    async fn test_configured_default_speed() {
        let fx = Fixture::new(&["$SPY"]);
        fx.speed.set(0).await.unwrap();
        let feed = fx.feed().with_default_speed(70);
        assert_eq!(feed.subscribe().borrow().speed, 70);
        assert_eq!(feed.speed(), 70);
        assert_eq!(feed.refresh().await.speed, 70);

        // A stored speed still wins.
        fx.speed.set(90).await.unwrap();
        assert_eq!(feed.speed(), 90);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("64250.50"), "64,250.50");
        assert_eq!(group_thousands("1234567.00"), "1,234,567.00");
        assert_eq!(group_thousands("999.99"), "999.99");
        assert_eq!(group_thousands("-1000.00"), "-1,000.00");
    }

    #[test]
    fn test_item_formatting() {
        let up = TickerItem::new("$SPY", dec!(500), dec!(1.5), dec!(0.3), LogoChoice::default());
        assert_eq!(up.price, "500.00");
        assert_eq!(up.change_label(), "+1.50 (+0.30%)");
        assert!(up.up);

        let down = TickerItem::new("BTC", dec!(64250.5), dec!(-1250.25), dec!(-1.9), LogoChoice::default());
        assert_eq!(down.price, "64,250.50");
        assert_eq!(down.change_label(), "-1250.25 (1.90%)");
        assert!(!down.up);

        let flat = TickerItem::new("GLD", Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, LogoChoice::default());
        assert_eq!(flat.change_label(), "+0.00 (+0.00%)");
    }

    #[test]
    fn test_logo_priority() {
        let mut custom = CustomLogos::new();
        custom.insert("$MSTR".into(), "data:image/png;base64,AAAA".into());

        let c = choose_logo("$MSTR", &custom, Some("../logos"), Some("https://api/MSTR.png"));
        assert_eq!(c.primary.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(c.fallback.as_deref(), Some("https://api/MSTR.png"));

        let c = choose_logo("$COIN", &custom, Some("../logos/"), Some("https://api/COIN.png"));
        assert_eq!(c.primary.as_deref(), Some("../logos/COIN.png"));
        assert_eq!(c.fallback.as_deref(), Some("https://api/COIN.png"));

        let c = choose_logo("$COIN", &custom, None, Some("https://api/COIN.png"));
        assert_eq!(c.primary.as_deref(), Some("https://api/COIN.png"));
        assert!(c.fallback.is_none());
    }

    #[test]
    fn test_logo_state_machine() {
        let choice = LogoChoice {
            primary: Some("a".into()),
            fallback: Some("b".into()),
        };
        let s = LogoState::Primary;
        assert_eq!(s.url(&choice), Some("a"));
        let s = s.on_error(&choice);
        assert_eq!(s, LogoState::Fallback);
        assert_eq!(s.url(&choice), Some("b"));
        let s = s.on_error(&choice);
        assert_eq!(s, LogoState::Hidden);
        assert_eq!(s.url(&choice), None);

        let lone = LogoChoice {
            primary: Some("a".into()),
            fallback: None,
        };
        assert_eq!(LogoState::Primary.on_error(&lone), LogoState::Hidden);
    }

    #[tokio::test]
    async fn test_failed_symbols_still_render() {
        let fx = Fixture::new(&["$MSTR", "BAD", "BTC", "ZERO"]);
        let view = fx.feed().refresh().await;
        assert_eq!(view.items.len(), 4);
        assert!(view.status.is_none());

        let bad = &view.items[1];
        assert_eq!(bad.symbol, "BAD");
        assert_eq!(bad.price, "0.00");
        assert!(bad.logo.primary.is_none());

        assert_eq!(view.items[0].symbol, "$MSTR");
        assert_eq!(view.items[2].price, "64,250.50");
        assert_eq!(view.items[3].price, "0.00");
    }

    #[tokio::test]
    async fn test_blank_entries_skipped() {
        let fx = Fixture::new(&["", "  ", "$SPY"]);
        let view = fx.feed().refresh().await;
        assert_eq!(view.items.len(), 1);
    }

    #[tokio::test]
    async fn test_no_tickers_status() {
        let fx = Fixture::new(&[]);
        let view = fx.feed().refresh().await;
        assert!(view.items.is_empty());
        assert_eq!(view.status.as_deref(), Some(NO_TICKERS));
    }

    #[tokio::test]
    async fn test_local_logo_dir_and_custom_logo() {
        let fx = Fixture::new(&["$MSTR", "$COIN"]);
        let mut logos = CustomLogos::new();
        logos.insert("$MSTR".into(), "data:image/png;base64,AAAA".into());
        fx.logos.set(logos).await.unwrap();

        let feed = fx.feed().with_local_logo_dir(Some("../logos".into()));
        let view = feed.refresh().await;
        assert_eq!(view.items[0].logo.primary.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(view.items[1].logo.primary.as_deref(), Some("../logos/COIN.png"));
        assert_eq!(
            view.items[1].logo.fallback.as_deref(),
            Some("https://logos.example/COIN.png")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_picks_up_speed_and_list_changes() {
        let fx = Fixture::new(&["$SPY"]);
        let feed = fx
            .feed()
            .with_timers(Duration::from_secs(60), Duration::from_millis(500));
        let mut rx = feed.subscribe();
        let task = tokio::spawn(feed.run());

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().items.len(), 1);

        fx.speed.set(120).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(rx.borrow().speed, 120);

        fx.tickers
            .set(vec!["$SPY".into(), "$QQQ".into()])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rx.borrow().items.len(), 2);

        task.abort();
    }

    #[tokio::test]
    async fn test_url_speed_overrides_store() {
        let fx = Fixture::new(&["$SPY"]);
        fx.speed.set(20).await.unwrap();
        let feed = fx.feed().with_url_speed(Some("75".into()));
        assert_eq!(feed.speed(), 75);
        assert_eq!(feed.refresh().await.speed, 75);
    }
}
