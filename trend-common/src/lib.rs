//! # Trend Common Library
//!
//! Shared code for the trend pipeline crates including:
//! - Domain models (observations, aggregates, keyword log rows, keyword detail)
//! - The fixed news category taxonomy
//! - Minute-bucket keys, window offsets and the injectable clock
//! - Event types and the EventBus used for hot-keyword fan-out
//! - Bootstrap configuration loading and validation
//! - SQLite schema bootstrap
//! - SSE stream helpers

pub mod categories;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use categories::MajorCategory;
pub use models::{
    EnrichmentResult, KeywordDetail, KeywordObservation, TopKeyword, TrendAggregate, TrendKeywordRecord,
};
pub use time::{BucketKey, Clock, ManualClock, SystemClock, WindowSpec};
