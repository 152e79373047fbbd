//! In-process score store
//!
//! Per-minute maps behind one mutex with manual eviction. Counters are not
//! shared between processes, so this backend is only correct for
//! single-instance deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use trend_common::{BucketKey, Clock};

use crate::error::{Error, Result};
use crate::store::ScoreStore;

#[derive(Debug, Default)]
struct Bucket {
    scores: HashMap<String, u64>,
    expires_at: Option<DateTime<Utc>>,
}

impl Bucket {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub struct MemoryScoreStore {
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
}

impl MemoryScoreStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Number of buckets currently held, expired or not
    pub fn bucket_count(&self) -> usize {
        self.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<BucketKey, Bucket>>> {
        self.buckets
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn increment(&self, bucket: &BucketKey, member: &str, delta: u64) -> Result<u64> {
        let now = self.clock.now();
        let mut buckets = self.lock()?;

        let entry = buckets.entry(bucket.clone()).or_default();
        if entry.is_expired(now) {
            // An expired key behaves as absent; writing to it starts over
            *entry = Bucket::default();
        }

        let score = entry.scores.entry(member.to_string()).or_insert(0);
        *score = score.saturating_add(delta);
        Ok(*score)
    }

    async fn read_all_with_scores(&self, bucket: &BucketKey) -> Result<Vec<(String, u64)>> {
        let now = self.clock.now();
        let buckets = self.lock()?;

        Ok(match buckets.get(bucket) {
            Some(entry) if !entry.is_expired(now) => {
                entry.scores.iter().map(|(k, v)| (k.clone(), *v)).collect()
            }
            _ => Vec::new(),
        })
    }

    async fn expire(&self, bucket: &BucketKey, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::Store(format!("TTL out of range: {}", e)))?;
        let now = self.clock.now();
        let mut buckets = self.lock()?;

        if let Some(entry) = buckets.get_mut(bucket) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut buckets = self.lock()?;

        let before = buckets.len();
        buckets.retain(|_, entry| !entry.is_expired(now));
        let purged = before - buckets.len();
        if purged > 0 {
            debug!(purged, "Evicted expired in-memory buckets");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trend_common::ManualClock;

    fn bucket() -> BucketKey {
        BucketKey::parse("trend:202406061230").unwrap()
    }

    fn setup() -> (Arc<ManualClock>, MemoryScoreStore) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 6, 3, 30, 0).unwrap()));
        let store = MemoryScoreStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn test_increments_are_additive() {
        let (_clock, store) = setup();
        store.increment(&bucket(), "rust", 3).await.unwrap();
        assert_eq!(store.increment(&bucket(), "rust", 4).await.unwrap(), 7);
        assert_eq!(store.read_all_with_scores(&bucket()).await.unwrap(), vec![("rust".to_string(), 7)]);
    }

    #[tokio::test]
    async fn test_absent_bucket_reads_empty() {
        let (_clock, store) = setup();
        assert!(store.read_all_with_scores(&bucket()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_bucket_reads_empty_and_restarts_on_write() {
        let (clock, store) = setup();
        store.increment(&bucket(), "rust", 10).await.unwrap();
        store.expire(&bucket(), Duration::from_secs(60)).await.unwrap();

        clock.advance(chrono::Duration::seconds(61));
        assert!(store.read_all_with_scores(&bucket()).await.unwrap().is_empty());
        assert_eq!(store.increment(&bucket(), "rust", 2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let (clock, store) = setup();
        let other = BucketKey::parse("trend:202406061231").unwrap();

        store.increment(&bucket(), "a", 1).await.unwrap();
        store.expire(&bucket(), Duration::from_secs(60)).await.unwrap();
        store.increment(&other, "b", 1).await.unwrap();
        store.expire(&other, Duration::from_secs(600)).await.unwrap();

        clock.advance(chrono::Duration::seconds(120));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.bucket_count(), 1);
    }

    #[tokio::test]
    async fn test_saturates_instead_of_wrapping() {
        let (_clock, store) = setup();
        store.increment(&bucket(), "rust", u64::MAX).await.unwrap();
        assert_eq!(store.increment(&bucket(), "rust", 5).await.unwrap(), u64::MAX);
    }
}
