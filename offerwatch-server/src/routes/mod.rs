pub mod offers;

use crate::infra::app_state::AppState;
use axum::Router;

/// Create the API router. Everything mounted here lives under the `/api`
/// namespace and is therefore covered by the request instrumentation.
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest("/api", offers::router())
}
