//! Relay HTTP service: Axum router for the overlay endpoints.
//!
//! Small JSON endpoints that remote overlay documents poll. CORS is open
//! to any origin so OBS browser sources on other hosts can read them.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::types::OverlayError;

pub use routes::{AppState, RelayState};

/// Cache policy for the header and name-tag endpoints.
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Serve the relay on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(%addr, "Relay listening on http://{addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Relay server error")?;

    info!("Relay stopped");
    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/api/ticker-data",
            get(routes::get_ticker)
                .options(routes::options_ok)
                .fallback(routes::method_not_allowed),
        )
        .route(
            "/api/header-data",
            get(routes::get_header)
                .post(routes::save_header)
                .put(routes::refresh_header)
                .options(routes::options_ok)
                .fallback(routes::method_not_allowed)
                .layer(middleware::map_response(no_cache)),
        )
        .route(
            "/api/nametag-data",
            get(routes::get_nametag)
                .post(routes::save_nametag)
                .put(routes::refresh_nametag)
                .options(routes::options_ok)
                .fallback(routes::method_not_allowed)
                .layer(middleware::map_response(no_cache)),
        )
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

async fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    response
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

impl IntoResponse for OverlayError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            OverlayError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            OverlayError::InvalidRequest { error, message } => {
                let body = match message {
                    Some(message) => json!({ "error": error, "message": message }),
                    None => json!({ "error": error }),
                };
                (StatusCode::BAD_REQUEST, body)
            }
            OverlayError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method not allowed" }),
            ),
            OverlayError::Storage(msg) => {
                error!(error = %msg, "Storage failure while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Storage error", "message": msg }),
                )
            }
            OverlayError::Relay(msg) => (StatusCode::BAD_GATEWAY, json!({ "error": msg })),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::api::routes::test_support::test_state;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/header-data")
                    .header(header::ORIGIN, "http://obs.local")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_header_on_simple_request() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/header-data")
                    .header(header::ORIGIN, "http://obs.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), NO_CACHE);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let resp = OverlayError::invalid_body("expected value").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Invalid request body");
        assert_eq!(json["message"], "expected value");

        let resp = OverlayError::Config("API key not configured".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "API key not configured");

        assert_eq!(
            OverlayError::Storage("disk full".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            OverlayError::Relay("down".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_serve_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, test_state(), async {
            let _ = rx.await;
        }));

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert!(resp.status().is_success());

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
