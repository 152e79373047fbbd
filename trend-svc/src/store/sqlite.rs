//! SQLite-backed score store
//!
//! Counters live in `score_buckets` and expiry in `score_bucket_expiry`, so
//! every replica pointing at the same database file shares one counter space.
//! Each increment is one write transaction, which SQLite serializes across
//! connections and processes, so concurrent increments never lose updates.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use trend_common::{BucketKey, Clock};

use crate::error::{Error, Result};
use crate::store::ScoreStore;

pub struct SqliteScoreStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteScoreStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn to_db_score(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Store(format!("score {} exceeds storable range", value)))
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn increment(&self, bucket: &BucketKey, member: &str, delta: u64) -> Result<u64> {
        let delta = to_db_score(delta)?;
        let now_ms = self.now_ms();
        let mut tx = self.pool.begin().await?;

        // An expired bucket behaves as absent; clear it before writing. The
        // first statement must be a write so the transaction takes the write
        // lock (waiting on busy_timeout) instead of upgrading a stale read
        // snapshot, which fails at once under WAL.
        sqlx::query(
            r#"
            DELETE FROM score_buckets
            WHERE bucket_key = ?
              AND EXISTS (
                  SELECT 1 FROM score_bucket_expiry
                  WHERE bucket_key = ? AND expires_at_ms <= ?
              )
            "#,
        )
        .bind(bucket.as_str())
        .bind(bucket.as_str())
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM score_bucket_expiry WHERE bucket_key = ? AND expires_at_ms <= ?")
            .bind(bucket.as_str())
            .bind(now_ms)
            .execute(&mut *tx)
            .await?;

        let score: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO score_buckets (bucket_key, member, score)
            VALUES (?, ?, ?)
            ON CONFLICT(bucket_key, member) DO UPDATE SET score = score + excluded.score
            RETURNING score
            "#,
        )
        .bind(bucket.as_str())
        .bind(member)
        .bind(delta)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(score.max(0) as u64)
    }

    async fn read_all_with_scores(&self, bucket: &BucketKey) -> Result<Vec<(String, u64)>> {
        let rows = sqlx::query(
            r#"
            SELECT b.member, b.score
            FROM score_buckets b
            WHERE b.bucket_key = ?
              AND NOT EXISTS (
                  SELECT 1 FROM score_bucket_expiry e
                  WHERE e.bucket_key = b.bucket_key AND e.expires_at_ms <= ?
              )
            "#,
        )
        .bind(bucket.as_str())
        .bind(self.now_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let member: String = row.get("member");
                let score: i64 = row.get("score");
                (member, score.max(0) as u64)
            })
            .collect())
    }

    async fn expire(&self, bucket: &BucketKey, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).map_err(|_| Error::Store("TTL out of range".to_string()))?;
        let expires_at_ms = self.now_ms().saturating_add(ttl_ms);

        sqlx::query(
            r#"
            INSERT INTO score_bucket_expiry (bucket_key, expires_at_ms)
            VALUES (?, ?)
            ON CONFLICT(bucket_key) DO UPDATE SET expires_at_ms = excluded.expires_at_ms
            "#,
        )
        .bind(bucket.as_str())
        .bind(expires_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now_ms = self.now_ms();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM score_buckets
            WHERE bucket_key IN (SELECT bucket_key FROM score_bucket_expiry WHERE expires_at_ms <= ?)
            "#,
        )
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        let purged = sqlx::query("DELETE FROM score_bucket_expiry WHERE expires_at_ms <= ?")
            .bind(now_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        if purged > 0 {
            debug!(purged, "Purged expired score buckets");
        }
        Ok(purged as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use trend_common::db::init_memory_database;
    use trend_common::ManualClock;

    fn bucket() -> BucketKey {
        BucketKey::parse("trend:202406061230").unwrap()
    }

    async fn setup() -> (Arc<ManualClock>, SqliteScoreStore) {
        let pool = init_memory_database().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 6, 3, 30, 0).unwrap()));
        (clock.clone(), SqliteScoreStore::new(pool, clock))
    }

    #[tokio::test]
    async fn test_upsert_accumulates() {
        let (_clock, store) = setup().await;
        assert_eq!(store.increment(&bucket(), "rust", 5).await.unwrap(), 5);
        assert_eq!(store.increment(&bucket(), "rust", 7).await.unwrap(), 12);
        store.increment(&bucket(), "go", 1).await.unwrap();

        let mut entries = store.read_all_with_scores(&bucket()).await.unwrap();
        entries.sort();
        assert_eq!(entries, vec![("go".to_string(), 1), ("rust".to_string(), 12)]);
    }

    #[tokio::test]
    async fn test_expiry_hides_then_purges() {
        let (clock, store) = setup().await;
        store.increment(&bucket(), "rust", 5).await.unwrap();
        store.expire(&bucket(), Duration::from_secs(900)).await.unwrap();

        clock.advance(chrono::Duration::minutes(14));
        assert_eq!(store.read_all_with_scores(&bucket()).await.unwrap().len(), 1);

        clock.advance(chrono::Duration::minutes(2));
        assert!(store.read_all_with_scores(&bucket()).await.unwrap().is_empty());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_after_expiry_starts_fresh() {
        let (clock, store) = setup().await;
        store.increment(&bucket(), "rust", 5).await.unwrap();
        store.expire(&bucket(), Duration::from_secs(60)).await.unwrap();

        clock.advance(chrono::Duration::minutes(2));
        assert_eq!(store.increment(&bucket(), "rust", 1).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_on_shared_file_all_land() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let pool = trend_common::db::init_database(&temp_dir.path().join("trends.db")).await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 6, 3, 30, 0).unwrap()));
        let store = Arc::new(crate::store::WindowedScoreStore::new(
            Arc::new(SqliteScoreStore::new(pool, clock)),
            Duration::from_secs(900),
        ));

        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.increment(&bucket(), &format!("k{}", i % 4), 1).await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let entries = store.read_all(&bucket()).await;
        assert_eq!(entries.values().sum::<u64>(), 200);
        for member in ["k0", "k1", "k2", "k3"] {
            assert_eq!(entries.get(member), Some(&50));
        }
    }

    #[tokio::test]
    async fn test_rejects_delta_beyond_i64() {
        let (_clock, store) = setup().await;
        assert!(matches!(store.increment(&bucket(), "rust", u64::MAX).await, Err(Error::Store(_))));
    }
}
