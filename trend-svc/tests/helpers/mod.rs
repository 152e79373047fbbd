//! Shared fixtures for trend-svc integration tests
//!
//! `MemoryTrendRepository` stands in for SQLite where tests run on paused
//! Tokio time: the SQLite driver works on its own thread, which a paused
//! runtime treats as idle and would race its acquire timeouts against.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trend_common::config::TomlConfig;
use trend_common::categories::{major_of, taxonomy};
use trend_common::{
    Clock, KeywordDetail, KeywordObservation, MajorCategory, TrendAggregate, TrendKeywordRecord,
};
use trend_svc::channel::BroadcastSink;
use trend_svc::error::{Error, Result};
use trend_svc::observer::Observer;
use trend_svc::repository::{SqliteTrendRepository, TrendRepository};
use trend_svc::service::{ServiceParts, TrendService};
use trend_svc::store::{MemoryScoreStore, SqliteScoreStore};

/// 2024-06-06 12:30:10 in UTC+09:00
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 6, 3, 30, 10).unwrap()
}

pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.pipeline.channel_capacity = 64;
    config.pipeline.notification_capacity = 64;
    config
}

pub fn observation(keyword: &str, traffic: u64, at: DateTime<Utc>) -> KeywordObservation {
    KeywordObservation::new(keyword, traffic, at).unwrap()
}

/// Observer that sleeps on Tokio time before each batch
///
/// `delays` are consumed one per call; once exhausted, calls return at once.
pub struct SlowObserver {
    delays: Mutex<VecDeque<Duration>>,
    batch: Vec<KeywordObservation>,
    calls: AtomicUsize,
}

impl SlowObserver {
    pub fn new(delays: Vec<Duration>, batch: Vec<KeywordObservation>) -> Self {
        Self {
            delays: Mutex::new(delays.into()),
            batch,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Observer for SlowObserver {
    async fn observe(&self) -> Result<Vec<KeywordObservation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.batch.clone())
    }
}

/// Observer whose transport always fails
pub struct FailingObserver;

#[async_trait]
impl Observer for FailingObserver {
    async fn observe(&self) -> Result<Vec<KeywordObservation>> {
        Err(Error::Observer("crawler unreachable".to_string()))
    }
}

/// Map-backed repository with the same merge rules as the SQLite one
#[derive(Default)]
pub struct MemoryTrendRepository {
    trends: Mutex<HashMap<String, TrendAggregate>>,
    log: Mutex<Vec<TrendKeywordRecord>>,
    details: Mutex<HashMap<String, KeywordDetail>>,
}

#[async_trait]
impl TrendRepository for MemoryTrendRepository {
    async fn find(&self, keyword: &str) -> Result<Option<TrendAggregate>> {
        Ok(self.trends.lock().unwrap().get(keyword).cloned())
    }

    async fn insert_if_absent(&self, keyword: &str, traffic: u64, at: DateTime<Utc>) -> Result<bool> {
        let mut trends = self.trends.lock().unwrap();
        if trends.contains_key(keyword) {
            return Ok(false);
        }
        trends.insert(
            keyword.to_string(),
            TrendAggregate {
                keyword: keyword.to_string(),
                traffic,
                sub_categories: Vec::new(),
                summary: None,
                blog_post: None,
                created_at: at,
            },
        );
        Ok(true)
    }

    async fn raise_traffic(&self, keyword: &str, traffic: u64, floor: u64, _at: DateTime<Utc>) -> Result<bool> {
        let mut trends = self.trends.lock().unwrap();
        match trends.get_mut(keyword) {
            Some(existing) if traffic >= floor && traffic > existing.traffic => {
                existing.traffic = traffic;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_enrichment(
        &self,
        keyword: &str,
        categories: &[String],
        summary: Option<&str>,
        blog_post: Option<&str>,
        _at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut trends = self.trends.lock().unwrap();
        match trends.get_mut(keyword) {
            Some(existing) => {
                existing.sub_categories = categories.to_vec();
                existing.summary = summary.map(str::to_string);
                existing.blog_post = blog_post.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_keyword_record(
        &self,
        keyword: &str,
        approx_traffic: u64,
        at: DateTime<Utc>,
    ) -> Result<TrendKeywordRecord> {
        let mut log = self.log.lock().unwrap();
        let record = TrendKeywordRecord {
            id: log.len() as i64 + 1,
            keyword: keyword.to_string(),
            approx_traffic,
            created_at: at,
        };
        log.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, keyword: &str) -> Result<bool> {
        Ok(self.trends.lock().unwrap().remove(keyword).is_some())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<TrendKeywordRecord>> {
        Ok(self.log.lock().unwrap().iter().rev().take(limit).cloned().collect())
    }

    async fn resolve_sub_categories(&self, names: &[String]) -> Result<Vec<String>> {
        let mut resolved: Vec<String> = Vec::new();
        for name in names {
            if major_of(name).is_some() && !resolved.contains(name) {
                resolved.push(name.clone());
            }
        }
        Ok(resolved)
    }

    async fn list_categories(&self) -> Result<Vec<MajorCategory>> {
        Ok(taxonomy())
    }

    async fn record_sighting(&self, observation: &KeywordObservation) -> Result<KeywordDetail> {
        let mut details = self.details.lock().unwrap();
        let detail = details
            .entry(observation.keyword.clone())
            .and_modify(|d| {
                d.sightings += 1;
                d.total_traffic += observation.traffic_estimate;
                d.first_seen = d.first_seen.min(observation.observed_at);
                d.last_seen = d.last_seen.max(observation.observed_at);
                d.news_sources = observation.news_source_count() as u64;
            })
            .or_insert_with(|| KeywordDetail {
                keyword: observation.keyword.clone(),
                sightings: 1,
                total_traffic: observation.traffic_estimate,
                first_seen: observation.observed_at,
                last_seen: observation.observed_at,
                news_sources: observation.news_source_count() as u64,
            });
        Ok(detail.clone())
    }

    async fn find_detail(&self, keyword: &str) -> Result<Option<KeywordDetail>> {
        Ok(self.details.lock().unwrap().get(keyword).cloned())
    }

    async fn top_sightings(&self, limit: usize) -> Result<Vec<KeywordDetail>> {
        let mut all: Vec<KeywordDetail> = self.details.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.sightings.cmp(&a.sightings).then_with(|| a.keyword.cmp(&b.keyword)));
        all.truncate(limit);
        Ok(all)
    }
}

/// Service over a file-backed SQLite database shared by the score store and
/// the repository, as a replica deployment runs it
pub async fn build_sqlite_service(
    config: &TomlConfig,
    db_path: &std::path::Path,
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
) -> TrendService {
    let pool = trend_common::db::init_database(db_path).await.unwrap();
    TrendService::assemble(
        config,
        ServiceParts {
            score_store: Arc::new(SqliteScoreStore::new(pool.clone(), clock.clone())),
            repository: Arc::new(SqliteTrendRepository::new(pool)),
            observer,
            sink: Arc::new(BroadcastSink::new(256)),
            clock,
        },
    )
    .unwrap()
}

/// A fully wired service plus handles tests poke at directly
pub struct Harness {
    pub service: TrendService,
    pub store: Arc<MemoryScoreStore>,
    pub sink: BroadcastSink,
}

pub fn build_harness(
    config: &TomlConfig,
    observer: Arc<dyn Observer>,
    repository: Arc<dyn TrendRepository>,
    clock: Arc<dyn Clock>,
) -> Harness {
    let store = Arc::new(MemoryScoreStore::new(clock.clone()));
    let sink = BroadcastSink::new(256);

    let service = TrendService::assemble(
        config,
        ServiceParts {
            score_store: store.clone(),
            repository,
            observer,
            sink: Arc::new(sink.clone()),
            clock,
        },
    )
    .unwrap();

    Harness { service, store, sink }
}
