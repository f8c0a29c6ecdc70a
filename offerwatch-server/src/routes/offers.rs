use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::{
    errors::{AppError, AppResult},
    infra::{app_state::AppState, startup::DAILY_SCAN_JOB},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/offers", get(list_offers))
        .route("/offers/{site}", get(site_offers))
        .route("/scan", post(trigger_scan))
        .route("/jobs", get(job_status))
}

async fn list_offers(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let offers = state.store().list_offers().await?;
    Ok(Json(json!({
        "count": offers.len(),
        "offers": offers,
    })))
}

async fn site_offers(
    State(state): State<AppState>,
    Path(site): Path<String>,
) -> AppResult<Json<Value>> {
    let offers = state.store().offers_for_site(&site).await?;
    if offers.is_empty() {
        return Err(AppError::not_found(format!(
            "no offers recorded for {site}"
        )));
    }
    Ok(Json(json!({
        "site": site,
        "count": offers.len(),
        "offers": offers,
    })))
}

/// Runs the primary full scan immediately, outside the timer cadence.
async fn trigger_scan(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state
        .registry()
        .run_once(DAILY_SCAN_JOB)
        .await
        .map_err(AppError::from)?;
    Ok(Json(json!({
        "job": DAILY_SCAN_JOB,
        "status": "completed",
    })))
}

async fn job_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "jobs": state.registry().snapshot(),
    }))
}
