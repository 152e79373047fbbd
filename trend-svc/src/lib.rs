//! trend-svc library - trend keyword pipeline
//!
//! Ingests crawler observations into minute buckets, ranks the recent window
//! (backfilling from the preceding one), flags bursts between the two windows
//! and publishes keyword/aggregate changes downstream.

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod burst;
pub mod channel;
pub mod error;
pub mod notify;
pub mod observer;
pub mod publisher;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod stats;
pub mod store;
pub mod top_k;
pub mod window;

pub use error::{Error, Result};

use notify::NotificationHub;
use publisher::Publisher;
use repository::TrendRepository;
use scheduler::TrendPipeline;
use stats::CycleStats;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TrendPipeline>,
    pub repository: Arc<dyn TrendRepository>,
    pub publisher: Arc<Publisher>,
    pub hub: NotificationHub,
    pub stats: Arc<CycleStats>,
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::trend_routes())
        .merge(api::notification_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
