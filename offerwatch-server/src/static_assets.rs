//! Fixed static asset endpoints: the extension download page, the packaged
//! client bundle, and the install script. Files are read from the configured
//! asset directory on each request; the bundle endpoint pins its content
//! type to a script media type explicitly.

use axum::{
    Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{errors::AppError, infra::app_state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/download", get(download_page))
        .route("/bundle/offerwatch-client.js", get(client_bundle))
        .route("/install.sh", get(install_script))
}

async fn download_page(State(state): State<AppState>) -> Response {
    serve_asset(&state, "download.html", "text/html; charset=utf-8").await
}

async fn client_bundle(State(state): State<AppState>) -> Response {
    serve_asset(&state, "offerwatch-client.js", "application/javascript").await
}

async fn install_script(State(state): State<AppState>) -> Response {
    serve_asset(&state, "install.sh", "text/plain; charset=utf-8").await
}

async fn serve_asset(
    state: &AppState,
    name: &str,
    content_type: &'static str,
) -> Response {
    let path = state.config().asset_dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => {
            AppError::not_found(format!("asset not found: {name}"))
                .into_response()
        }
    }
}
