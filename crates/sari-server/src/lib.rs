//! SARI server: HTTP API, realtime relay and media hosting for the SARI
//! social network.
//!
//! The binary in `main.rs` only reads configuration and calls [`app`];
//! integration tests build the same router against an in-memory database.

pub mod api;
pub mod config;
pub mod error;
pub mod mailer;
pub mod media;
pub mod relay;
pub mod session;
pub mod state;
pub mod storage;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::warn;

use config::MAX_UPLOAD_BYTES;
use state::SharedState;

/// Build the full router.
pub fn app(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(relay::ws_handler))
        .merge(api::routes())
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        // Multipart bodies carry a file plus a few text fields.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .layer(cors(&state.config.frontend_url))
        .with_state(state)
}

/// Credentialed CORS for the configured frontend origin only.
fn cors(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);
    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("FRONTEND_URL is not a valid origin ({e}); cross-origin requests disabled");
            layer
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
