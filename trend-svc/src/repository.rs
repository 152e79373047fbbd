//! Durable trend aggregates and the raw keyword log
//!
//! `trends` holds one row per keyword whose `traffic` only ever rises through
//! [`TrendRepository::raise_traffic`]; [`TrendRepository::delete`] is the only
//! way a row's traffic goes away. `trend_keywords` is append-only.
//! `keyword_details` keeps running sighting statistics per keyword, and the
//! category tables hold the fixed taxonomy enrichment resolves against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::debug;
use trend_common::{KeywordDetail, KeywordObservation, MajorCategory, TrendAggregate, TrendKeywordRecord};

use crate::error::{Error, Result};

#[async_trait]
pub trait TrendRepository: Send + Sync {
    async fn find(&self, keyword: &str) -> Result<Option<TrendAggregate>>;

    /// Create the aggregate unless one exists; true when this call created it
    async fn insert_if_absent(&self, keyword: &str, traffic: u64, at: DateTime<Utc>) -> Result<bool>;

    /// Raise traffic to `traffic` iff it exceeds the stored value and reaches `floor`
    ///
    /// One conditional write, so redelivering the same value is a no-op.
    async fn raise_traffic(&self, keyword: &str, traffic: u64, floor: u64, at: DateTime<Utc>) -> Result<bool>;

    /// Overwrite categories, summary and blog post; false when the keyword is unknown
    async fn apply_enrichment(
        &self,
        keyword: &str,
        categories: &[String],
        summary: Option<&str>,
        blog_post: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Known sub-category names from `names`, deduplicated, in input order
    async fn resolve_sub_categories(&self, names: &[String]) -> Result<Vec<String>>;

    /// The category tree in taxonomy order
    async fn list_categories(&self) -> Result<Vec<MajorCategory>>;

    /// Fold one observation into the keyword's running statistics
    async fn record_sighting(&self, observation: &KeywordObservation) -> Result<KeywordDetail>;

    async fn find_detail(&self, keyword: &str) -> Result<Option<KeywordDetail>>;

    /// Most-sighted keywords first; ties by keyword
    async fn top_sightings(&self, limit: usize) -> Result<Vec<KeywordDetail>>;

    async fn append_keyword_record(
        &self,
        keyword: &str,
        approx_traffic: u64,
        at: DateTime<Utc>,
    ) -> Result<TrendKeywordRecord>;

    async fn delete(&self, keyword: &str) -> Result<bool>;

    /// Newest keyword log rows first
    async fn list_recent(&self, limit: usize) -> Result<Vec<TrendKeywordRecord>>;
}

fn to_db_traffic(traffic: u64) -> Result<i64> {
    i64::try_from(traffic).map_err(|_| Error::Common(trend_common::Error::InvalidInput(format!(
        "traffic {} exceeds storable range",
        traffic
    ))))
}

fn aggregate_from_row(row: &SqliteRow) -> Result<TrendAggregate> {
    let categories: String = row.try_get("sub_categories")?;
    let traffic: i64 = row.try_get("traffic")?;
    Ok(TrendAggregate {
        keyword: row.try_get("keyword")?,
        traffic: traffic.max(0) as u64,
        sub_categories: serde_json::from_str(&categories)?,
        summary: row.try_get("summary")?,
        blog_post: row.try_get("blog_post")?,
        created_at: row.try_get("created_at")?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<TrendKeywordRecord> {
    let approx_traffic: i64 = row.try_get("approx_traffic")?;
    Ok(TrendKeywordRecord {
        id: row.try_get("id")?,
        keyword: row.try_get("keyword")?,
        approx_traffic: approx_traffic.max(0) as u64,
        created_at: row.try_get("created_at")?,
    })
}

fn detail_from_row(row: &SqliteRow) -> Result<KeywordDetail> {
    let sightings: i64 = row.try_get("sightings")?;
    let total_traffic: i64 = row.try_get("total_traffic")?;
    let news_sources: i64 = row.try_get("news_sources")?;
    Ok(KeywordDetail {
        keyword: row.try_get("keyword")?,
        sightings: sightings.max(0) as u64,
        total_traffic: total_traffic.max(0) as u64,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        news_sources: news_sources.max(0) as u64,
    })
}

pub struct SqliteTrendRepository {
    pool: SqlitePool,
}

impl SqliteTrendRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrendRepository for SqliteTrendRepository {
    async fn find(&self, keyword: &str) -> Result<Option<TrendAggregate>> {
        let row = sqlx::query(
            r#"
            SELECT keyword, traffic, sub_categories, summary, blog_post, created_at
            FROM trends
            WHERE keyword = ?
            "#,
        )
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(aggregate_from_row).transpose()
    }

    async fn insert_if_absent(&self, keyword: &str, traffic: u64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO trends (keyword, traffic, sub_categories, created_at, updated_at)
            VALUES (?, ?, '[]', ?, ?)
            ON CONFLICT(keyword) DO NOTHING
            "#,
        )
        .bind(keyword)
        .bind(to_db_traffic(traffic)?)
        .bind(at)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn raise_traffic(&self, keyword: &str, traffic: u64, floor: u64, at: DateTime<Utc>) -> Result<bool> {
        if traffic < floor {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE trends
            SET traffic = ?, updated_at = ?
            WHERE keyword = ? AND traffic < ?
            "#,
        )
        .bind(to_db_traffic(traffic)?)
        .bind(at)
        .bind(keyword)
        .bind(to_db_traffic(traffic)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_enrichment(
        &self,
        keyword: &str,
        categories: &[String],
        summary: Option<&str>,
        blog_post: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE trends
            SET sub_categories = ?, summary = ?, blog_post = ?, updated_at = ?
            WHERE keyword = ?
            "#,
        )
        .bind(serde_json::to_string(categories)?)
        .bind(summary)
        .bind(blog_post)
        .bind(at)
        .bind(keyword)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_keyword_record(
        &self,
        keyword: &str,
        approx_traffic: u64,
        at: DateTime<Utc>,
    ) -> Result<TrendKeywordRecord> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO trend_keywords (keyword, approx_traffic, created_at)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(keyword)
        .bind(to_db_traffic(approx_traffic)?)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(TrendKeywordRecord {
            id,
            keyword: keyword.to_string(),
            approx_traffic,
            created_at: at,
        })
    }

    async fn delete(&self, keyword: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trends WHERE keyword = ?")
            .bind(keyword)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() == 1;
        if deleted {
            debug!(keyword, "Deleted trend aggregate");
        }
        Ok(deleted)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<TrendKeywordRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT id, keyword, approx_traffic, created_at
            FROM trend_keywords
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn resolve_sub_categories(&self, names: &[String]) -> Result<Vec<String>> {
        let names_in_db: Vec<String> = sqlx::query_scalar("SELECT name FROM sub_categories")
            .fetch_all(&self.pool)
            .await?;
        let known: HashSet<String> = names_in_db.into_iter().collect();

        let mut resolved: Vec<String> = Vec::new();
        for name in names {
            if known.contains(name) && !resolved.contains(name) {
                resolved.push(name.clone());
            }
        }
        Ok(resolved)
    }

    async fn list_categories(&self) -> Result<Vec<MajorCategory>> {
        let rows = sqlx::query(
            r#"
            SELECT m.name AS major, s.name AS sub
            FROM major_categories m
            LEFT JOIN sub_categories s ON s.major_id = m.id
            ORDER BY m.id, s.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tree: Vec<MajorCategory> = Vec::new();
        for row in rows {
            let major: String = row.try_get("major")?;
            let sub: Option<String> = row.try_get("sub")?;
            if tree.last().map(|m| m.name != major).unwrap_or(true) {
                tree.push(MajorCategory {
                    name: major,
                    sub_categories: Vec::new(),
                });
            }
            if let (Some(sub), Some(current)) = (sub, tree.last_mut()) {
                current.sub_categories.push(sub);
            }
        }
        Ok(tree)
    }

    async fn record_sighting(&self, observation: &KeywordObservation) -> Result<KeywordDetail> {
        let news_sources = i64::try_from(observation.news_source_count()).unwrap_or(i64::MAX);
        let row = sqlx::query(
            r#"
            INSERT INTO keyword_details (keyword, sightings, total_traffic, first_seen, last_seen, news_sources)
            VALUES (?, 1, ?, ?, ?, ?)
            ON CONFLICT(keyword) DO UPDATE SET
                sightings = sightings + 1,
                total_traffic = total_traffic + excluded.total_traffic,
                first_seen = MIN(first_seen, excluded.first_seen),
                last_seen = MAX(last_seen, excluded.last_seen),
                news_sources = excluded.news_sources
            RETURNING keyword, sightings, total_traffic, first_seen, last_seen, news_sources
            "#,
        )
        .bind(&observation.keyword)
        .bind(to_db_traffic(observation.traffic_estimate)?)
        .bind(observation.observed_at)
        .bind(observation.observed_at)
        .bind(news_sources)
        .fetch_one(&self.pool)
        .await?;

        detail_from_row(&row)
    }

    async fn find_detail(&self, keyword: &str) -> Result<Option<KeywordDetail>> {
        let row = sqlx::query(
            r#"
            SELECT keyword, sightings, total_traffic, first_seen, last_seen, news_sources
            FROM keyword_details
            WHERE keyword = ?
            "#,
        )
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(detail_from_row).transpose()
    }

    async fn top_sightings(&self, limit: usize) -> Result<Vec<KeywordDetail>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT keyword, sightings, total_traffic, first_seen, last_seen, news_sources
            FROM keyword_details
            ORDER BY sightings DESC, keyword ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(detail_from_row).collect()
    }
}
