//! Trend listing, lookup, keyword detail, categories and enrichment ingress

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use trend_common::{EnrichmentResult, KeywordDetail, MajorCategory, TopKeyword, TrendAggregate};

use crate::api::{ApiError, ApiResult};
use crate::AppState;

/// Upper bound on `k` accepted over HTTP
const MAX_TOP_K: usize = 100;

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HotResponse {
    pub hot: Vec<String>,
    /// Start of the cycle the set came from
    pub cycle_started_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn checked_k(state: &AppState, query: &TopQuery) -> ApiResult<usize> {
    let k = query.k.unwrap_or_else(|| state.pipeline.default_top_k());
    if k == 0 || k > MAX_TOP_K {
        return Err(ApiError::BadRequest(format!("k must be between 1 and {}", MAX_TOP_K)));
    }
    Ok(k)
}

/// GET /api/v1/trends/top?k=N
pub async fn get_top(State(state): State<AppState>, Query(query): Query<TopQuery>) -> ApiResult<Json<Vec<TopKeyword>>> {
    let k = checked_k(&state, &query)?;
    Ok(Json(state.pipeline.top_k(k).await))
}

/// GET /api/v1/trends/sightings?k=N
///
/// Keywords ranked by how often they were observed, not by traffic.
pub async fn get_sightings(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Json<Vec<KeywordDetail>>> {
    let k = checked_k(&state, &query)?;
    Ok(Json(state.repository.top_sightings(k).await?))
}

/// GET /api/v1/trends/:keyword/detail
pub async fn get_detail(State(state): State<AppState>, Path(keyword): Path<String>) -> ApiResult<Json<KeywordDetail>> {
    state
        .repository
        .find_detail(&keyword)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("keyword detail '{}'", keyword)))
}

/// GET /api/v1/categories
pub async fn get_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<MajorCategory>>> {
    Ok(Json(state.repository.list_categories().await?))
}

/// GET /api/v1/trends/hot
pub async fn get_hot(State(state): State<AppState>) -> Json<HotResponse> {
    let report = state.stats.last_report().await;
    Json(HotResponse {
        cycle_started_at: report.as_ref().map(|r| r.started_at),
        hot: report.map(|r| r.hot).unwrap_or_default(),
    })
}

/// GET /api/v1/trends/:keyword
pub async fn get_trend(State(state): State<AppState>, Path(keyword): Path<String>) -> ApiResult<Json<TrendAggregate>> {
    state
        .repository
        .find(&keyword)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("trend '{}'", keyword)))
}

/// POST /api/v1/trends/results
///
/// Ingress for `trend-results` messages from the enrichment service.
pub async fn post_result(
    State(state): State<AppState>,
    Json(result): Json<EnrichmentResult>,
) -> ApiResult<(StatusCode, Json<TrendAggregate>)> {
    if result.keyword.trim().is_empty() {
        return Err(ApiError::BadRequest("keyword is blank".to_string()));
    }
    let merged = state.publisher.on_enrichment(result).await?;
    Ok((StatusCode::ACCEPTED, Json(merged)))
}

pub fn trend_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/trends/top", get(get_top))
        .route("/api/v1/trends/hot", get(get_hot))
        .route("/api/v1/trends/sightings", get(get_sightings))
        .route("/api/v1/trends/results", post(post_result))
        .route("/api/v1/trends/:keyword", get(get_trend))
        .route("/api/v1/trends/:keyword/detail", get(get_detail))
        .route("/api/v1/categories", get(get_categories))
}
