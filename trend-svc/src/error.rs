//! Error types for trend-svc
//!
//! Service-level failures wrap the shared `trend_common::Error` for anything
//! raised by the common crate (config, bucket keys, observations).

use std::time::Duration;
use thiserror::Error;

/// Main error type for trend-svc
#[derive(Error, Debug)]
pub enum Error {
    /// Counter store read/write failure
    #[error("Score store error: {0}")]
    Store(String),

    /// Observer poll failure
    #[error("Observer error: {0}")]
    Observer(String),

    /// Message could not be handed to the async channel
    #[error("Publish error: {0}")]
    Publish(String),

    /// Outbound HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors raised by trend-common
    #[error(transparent)]
    Common(#[from] trend_common::Error),

    /// A cycle ran past its deadline and was abandoned
    #[error("Cycle exceeded its {0:?} deadline")]
    CycleTimeout(Duration),
}

/// Convenience Result type using trend-svc Error
pub type Result<T> = std::result::Result<T, Error>;
