//! Windowed score store
//!
//! A bucket is a keyed set of additive counters for one wall-clock minute.
//! Backends implement [`ScoreStore`]; [`WindowedScoreStore`] layers the write
//! path (increment + TTL refresh) and the fail-open read path on top.
//!
//! No deduplication happens here: a redelivered observation inflates its
//! counter. Idempotency is the publisher's job.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use trend_common::BucketKey;

use crate::error::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryScoreStore;
pub use sqlite::SqliteScoreStore;

/// Keyed, TTL-bounded additive counters
///
/// Implementations must make `increment` atomic under concurrent writers and
/// must treat an expired bucket exactly like an absent one.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Add `delta` to `member` in `bucket`, returning the new score
    async fn increment(&self, bucket: &BucketKey, member: &str, delta: u64) -> Result<u64>;

    /// Every member of `bucket` with its score; empty for absent or expired buckets
    async fn read_all_with_scores(&self, bucket: &BucketKey) -> Result<Vec<(String, u64)>>;

    /// Set `bucket` to expire `ttl` from now
    async fn expire(&self, bucket: &BucketKey, ttl: Duration) -> Result<()>;

    /// Physically remove expired buckets, returning how many were dropped
    async fn purge_expired(&self) -> Result<usize>;
}

/// Bucket write/read façade used by the pipeline
#[derive(Clone)]
pub struct WindowedScoreStore {
    backend: Arc<dyn ScoreStore>,
    ttl: Duration,
}

impl WindowedScoreStore {
    pub fn new(backend: Arc<dyn ScoreStore>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Add `delta` to `keyword` in `bucket` and refresh the bucket's TTL
    pub async fn increment(&self, bucket: &BucketKey, keyword: &str, delta: u64) -> Result<u64> {
        let score = self.backend.increment(bucket, keyword, delta).await?;
        self.touch_expiry(bucket).await?;
        Ok(score)
    }

    /// Refresh the TTL of `bucket`
    pub async fn touch_expiry(&self, bucket: &BucketKey) -> Result<()> {
        self.backend.expire(bucket, self.ttl).await
    }

    /// Read one bucket, treating any backend failure as an empty bucket
    pub async fn read_all(&self, bucket: &BucketKey) -> HashMap<String, u64> {
        match self.backend.read_all_with_scores(bucket).await {
            Ok(entries) => entries.into_iter().collect(),
            Err(e) => {
                warn!(bucket = %bucket, "Bucket read failed, treating as empty: {}", e);
                HashMap::new()
            }
        }
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        self.backend.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FailingStore;

    #[async_trait]
    impl ScoreStore for FailingStore {
        async fn increment(&self, _: &BucketKey, _: &str, _: u64) -> Result<u64> {
            Err(Error::Store("unavailable".to_string()))
        }
        async fn read_all_with_scores(&self, _: &BucketKey) -> Result<Vec<(String, u64)>> {
            Err(Error::Store("unavailable".to_string()))
        }
        async fn expire(&self, _: &BucketKey, _: Duration) -> Result<()> {
            Ok(())
        }
        async fn purge_expired(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_read_failure_is_empty_bucket() {
        let store = WindowedScoreStore::new(Arc::new(FailingStore), Duration::from_secs(900));
        let bucket = BucketKey::parse("trend:202406061230").unwrap();

        assert!(store.read_all(&bucket).await.is_empty());
        assert!(store.increment(&bucket, "rust", 1).await.is_err());
    }
}
