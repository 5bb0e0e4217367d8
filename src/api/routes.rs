//! Relay route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<RelayState>`.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::market::TickerResolver;
use crate::state::OverlayState;
use crate::types::{
    HeaderSaved, HeaderUpdate, HeaderView, NameTagSaved, NameTagUpdate, NameTagView, OverlayError,
    RefreshResponse, Slot, SlotTarget,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct RelayState {
    pub overlay: OverlayState,
    pub tickers: TickerResolver,
}

impl RelayState {
    pub fn new(overlay: OverlayState, tickers: TickerResolver) -> Self {
        Self { overlay, tickers }
    }
}

pub type AppState = Arc<RelayState>;

type ApiResult<T> = Result<T, OverlayError>;

#[derive(Debug, Deserialize)]
pub struct TickerQuery {
    pub ticker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameTagQuery {
    pub id: Option<String>,
}

impl NameTagQuery {
    /// Slot addressed by GET/POST. No id means slot 0.
    fn slot(&self) -> ApiResult<Slot> {
        match self.id.as_deref().map(str::trim) {
            None | Some("") => Ok(Slot::FIRST),
            Some(raw) => raw.parse(),
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| OverlayError::invalid_body(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Plain OPTIONS without CORS preflight headers.
pub async fn options_ok() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> OverlayError {
    OverlayError::MethodNotAllowed
}

/// GET /api/ticker-data?ticker=SYM
pub async fn get_ticker(
    State(state): State<AppState>,
    Query(query): Query<TickerQuery>,
) -> ApiResult<impl IntoResponse> {
    if !state.tickers.is_configured() {
        return Err(OverlayError::Config("API key not configured".to_string()));
    }
    let symbol = query
        .ticker
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OverlayError::invalid("Ticker symbol required"))?;

    let payload = state.tickers.resolve(symbol).await;
    debug!(ticker = %symbol, fallback = payload.is_fallback(), "Ticker served");
    Ok(([(header::CACHE_CONTROL, "s-maxage=60")], Json(payload)))
}

/// GET /api/header-data
pub async fn get_header(State(state): State<AppState>) -> ApiResult<Json<HeaderView>> {
    Ok(Json(state.overlay.header().await?))
}

/// POST /api/header-data
pub async fn save_header(
    State(state): State<AppState>,
    payload: Result<Json<HeaderUpdate>, JsonRejection>,
) -> ApiResult<Json<HeaderSaved>> {
    let text = body(payload)?.into_text();
    let view = state.overlay.save_header(text).await?;
    info!(text = %view.text, "Header saved");
    Ok(Json(HeaderSaved {
        success: true,
        text: view.text,
        timestamp: view.timestamp,
    }))
}

/// PUT /api/header-data
pub async fn refresh_header(State(state): State<AppState>) -> ApiResult<Json<RefreshResponse>> {
    let stamp = state.overlay.refresh_header().await?;
    Ok(Json(RefreshResponse {
        success: true,
        message: Some("Header refreshed".to_string()),
        id: None,
        refresh_timestamp: stamp,
    }))
}

/// GET /api/nametag-data?id=N
pub async fn get_nametag(
    State(state): State<AppState>,
    Query(query): Query<NameTagQuery>,
) -> ApiResult<Json<NameTagView>> {
    let slot = query.slot()?;
    Ok(Json(state.overlay.nametag(slot).await?))
}

/// POST /api/nametag-data?id=N
pub async fn save_nametag(
    State(state): State<AppState>,
    Query(query): Query<NameTagQuery>,
    payload: Result<Json<NameTagUpdate>, JsonRejection>,
) -> ApiResult<Json<NameTagSaved>> {
    let slot = query.slot()?;
    let tag = body(payload)?.into_name_tag();
    let stamp = state.overlay.save_nametag(slot, tag).await?;
    Ok(Json(NameTagSaved {
        success: true,
        id: slot,
        timestamp: stamp,
    }))
}

/// PUT /api/nametag-data?id=N|all
pub async fn refresh_nametag(
    State(state): State<AppState>,
    Query(query): Query<NameTagQuery>,
) -> ApiResult<Json<RefreshResponse>> {
    let target = SlotTarget::parse(query.id.as_deref())?;
    let stamp = state.overlay.refresh_nametags(target).await?;
    let resp = match target {
        SlotTarget::All => RefreshResponse {
            success: true,
            message: Some("All name tags refreshed".to_string()),
            id: None,
            refresh_timestamp: stamp,
        },
        SlotTarget::One(slot) => RefreshResponse {
            success: true,
            message: None,
            id: Some(slot),
            refresh_timestamp: stamp,
        },
    };
    Ok(Json(resp))
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
