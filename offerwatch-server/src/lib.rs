//! # Offerwatch Server
//!
//! Web service that keeps offer data from a fixed set of external sites
//! fresh. The HTTP surface serves recorded offers and static client assets;
//! a bootstrap orchestrator supervises the background scanning subsystems
//! so harvesting never blocks request handling.
//!
//! The server is built on Axum and uses:
//! - two redundant probe scanners plus a new-member offer validator
//! - a job registry driving periodic scan and refresh cycles
//! - per-request instrumentation for every `/api` response

pub mod errors;
pub mod infra;
pub mod routes;
pub mod static_assets;

pub use infra::app_state::AppState;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::infra::{
    cors::{cors_layer, default_rules},
    middleware::request_log,
};

pub fn create_app(state: AppState) -> Router {
    let api = routes::create_api_router();
    let cors = cors_layer(default_rules(state.config().cors_allow_any));
    let dev_mode = state.config().dev_mode;
    let asset_dir = state.config().asset_dir.clone();

    // Public routes
    let mut app = Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(api)
        .merge(static_assets::router())
        // Middleware layers, innermost first:
        // 1. Request instrumentation (sees the handler-produced response)
        .layer(axum::middleware::from_fn(request_log::access_log))
        // 2. CORS (answers pre-flights for all paths)
        .layer(cors)
        // 3. Tracing
        .layer(TraceLayer::new_for_http());

    // Asset-serving mode is selected after all routes are registered so it
    // can never shadow an API route.
    if dev_mode {
        app = app.fallback_service(ServeDir::new(asset_dir));
    }

    app.with_state(state)
}

async fn ping_handler() -> ResponseJson<Value> {
    Json(json!({
        "status": "ok",
        "message": "offerwatch is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(
    State(state): State<AppState>,
) -> Result<ResponseJson<Value>, StatusCode> {
    match state.store().list_offers().await {
        Ok(offers) => {
            info!("Health endpoint called");
            Ok(Json(json!({
                "status": "healthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "version": env!("CARGO_PKG_VERSION"),
                "checks": {
                    "store": {
                        "status": "healthy",
                        "offers": offers.len(),
                    },
                    "jobs": state.registry().snapshot(),
                },
            })))
        }
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
