//! Window aggregation
//!
//! Merges a contiguous range of minute buckets into one score per keyword.
//! Every call builds a fresh map; nothing is shared between cycles.

use chrono::{DateTime, FixedOffset, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use trend_common::{BucketKey, WindowSpec};

use crate::store::WindowedScoreStore;

/// Keyword → summed score over one window
pub type WindowScore = HashMap<String, u64>;

pub struct WindowAggregator {
    store: Arc<WindowedScoreStore>,
    zone: FixedOffset,
}

impl WindowAggregator {
    pub fn new(store: Arc<WindowedScoreStore>, zone: FixedOffset) -> Self {
        Self { store, zone }
    }

    /// Bucket keys for `[now - end, now - start)`, newest first
    pub fn bucket_keys_for(&self, now: DateTime<Utc>, window: WindowSpec) -> Vec<BucketKey> {
        window.bucket_keys(now, self.zone)
    }

    /// Sum the given buckets per keyword
    ///
    /// Buckets are read concurrently. A missing, expired or unreadable bucket
    /// contributes nothing.
    pub async fn aggregate(&self, keys: &[BucketKey]) -> WindowScore {
        let buckets = join_all(keys.iter().map(|key| self.store.read_all(key))).await;

        let mut scores = WindowScore::new();
        for bucket in buckets {
            for (keyword, score) in bucket {
                let total = scores.entry(keyword).or_insert(0);
                *total = total.saturating_add(score);
            }
        }
        scores
    }

    pub async fn aggregate_window(&self, now: DateTime<Utc>, window: WindowSpec) -> WindowScore {
        let keys = self.bucket_keys_for(now, window);
        self.aggregate(&keys).await
    }
}
