//! Database initialization
//!
//! Creates the database file on first run and brings every table to the
//! current schema. All statements are idempotent, so every replica can run
//! this on startup against a shared file.

use crate::categories::CATEGORY_TAXONOMY;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How long a connection waits for another writer's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open (creating if needed) the database at `db_path` and create tables
///
/// WAL, synchronous mode and busy_timeout are applied to every pooled
/// connection.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every connection to `sqlite::memory:` is a distinct database, so the pool
/// is pinned to one connection that never idles out.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table used by the service
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_trends_table(pool).await?;
    create_trend_keywords_table(pool).await?;
    create_score_bucket_tables(pool).await?;
    create_category_tables(pool).await?;
    create_keyword_details_table(pool).await?;
    Ok(())
}

/// Durable per-keyword aggregates
///
/// `sub_categories` holds a JSON array of strings.
async fn create_trends_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trends (
            keyword TEXT PRIMARY KEY,
            traffic INTEGER NOT NULL CHECK (traffic >= 0),
            sub_categories TEXT NOT NULL DEFAULT '[]',
            summary TEXT,
            blog_post TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only raw observation history
async fn create_trend_keywords_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trend_keywords (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            keyword TEXT NOT NULL,
            approx_traffic INTEGER NOT NULL CHECK (approx_traffic >= 0),
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trend_keywords_created ON trend_keywords(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Minute-bucket counters shared by every replica using this file
///
/// Expiry is tracked per bucket (not per member) and stored as Unix
/// milliseconds so comparisons stay numeric.
async fn create_score_bucket_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS score_buckets (
            bucket_key TEXT NOT NULL,
            member TEXT NOT NULL,
            score INTEGER NOT NULL CHECK (score >= 0),
            PRIMARY KEY (bucket_key, member)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS score_bucket_expiry (
            bucket_key TEXT PRIMARY KEY,
            expires_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Major/sub category tree, seeded from the fixed taxonomy
async fn create_category_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS major_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sub_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            major_id INTEGER NOT NULL REFERENCES major_categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // INSERT OR IGNORE tolerates replicas seeding concurrently
    for (major, subs) in CATEGORY_TAXONOMY {
        sqlx::query("INSERT OR IGNORE INTO major_categories (name) VALUES (?)")
            .bind(*major)
            .execute(pool)
            .await?;

        for sub in *subs {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO sub_categories (name, major_id)
                SELECT ?, id FROM major_categories WHERE name = ?
                "#,
            )
            .bind(*sub)
            .bind(*major)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

/// Running per-keyword sighting statistics
async fn create_keyword_details_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keyword_details (
            keyword TEXT PRIMARY KEY,
            sightings INTEGER NOT NULL CHECK (sightings >= 0),
            total_traffic INTEGER NOT NULL CHECK (total_traffic >= 0),
            first_seen TIMESTAMP NOT NULL,
            last_seen TIMESTAMP NOT NULL,
            news_sources INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keyword_details_sightings ON keyword_details(sightings)")
        .execute(pool)
        .await?;

    Ok(())
}
