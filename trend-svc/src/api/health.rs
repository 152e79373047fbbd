//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::stats::{CycleReport, StatsSnapshot};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Most recent completed cycle, absent before the first one finishes
    pub last_cycle: Option<CycleReport>,
    pub stats: StatsSnapshot,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "trend-svc".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        last_cycle: state.stats.last_report().await,
        stats: state.stats.snapshot(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
