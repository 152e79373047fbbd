//! Domain models shared by the trend crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Error, Result};

/// One keyword sighting produced by an observer poll
///
/// Ephemeral: built once per observer call and consumed by the same cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordObservation {
    pub keyword: String,
    pub traffic_estimate: u64,
    pub observed_at: DateTime<Utc>,
    /// Article URLs the crawler attached to this sighting
    #[serde(default)]
    pub news_urls: Vec<String>,
}

impl KeywordObservation {
    /// Build an observation, rejecting blank keywords
    ///
    /// Surrounding whitespace is trimmed so that the same keyword scraped with
    /// different padding lands on one counter.
    pub fn new(keyword: impl AsRef<str>, traffic_estimate: u64, observed_at: DateTime<Utc>) -> Result<Self> {
        let keyword = keyword.as_ref().trim();
        if keyword.is_empty() {
            return Err(Error::InvalidInput("observation keyword is blank".to_string()));
        }
        Ok(Self {
            keyword: keyword.to_string(),
            traffic_estimate,
            observed_at,
            news_urls: Vec::new(),
        })
    }

    pub fn with_news_urls(mut self, urls: Vec<String>) -> Self {
        self.news_urls = urls;
        self
    }

    /// Distinct article URLs in this sighting
    pub fn news_source_count(&self) -> usize {
        self.news_urls.iter().collect::<HashSet<_>>().len()
    }
}

/// Append-only raw observation history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendKeywordRecord {
    pub id: i64,
    pub keyword: String,
    pub approx_traffic: u64,
    pub created_at: DateTime<Utc>,
}

/// Durable per-keyword aggregate
///
/// `traffic` is a high-water mark: the merge path only ever raises it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendAggregate {
    pub keyword: String,
    pub traffic: u64,
    pub sub_categories: Vec<String>,
    pub summary: Option<String>,
    pub blog_post: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of a top-K listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopKeyword {
    pub keyword: String,
    pub traffic: u64,
}

/// Enrichment produced downstream and merged back through `trend-results`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub keyword: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, alias = "blogPost")]
    pub blog_post: Option<String>,
}

/// Running per-keyword sighting statistics
///
/// Updated once per observation. Ranking by `sightings` gives the
/// keywords seen most often, independent of their traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordDetail {
    pub keyword: String,
    pub sightings: u64,
    /// Sum of every observed traffic estimate
    pub total_traffic: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Distinct article URLs in the latest sighting
    pub news_sources: u64,
}

/// Payload of a `trend-keywords` notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordNotice {
    pub keyword: String,
    pub traffic: u64,
    /// True when this notice created the aggregate
    pub created: bool,
    pub observed_at: DateTime<Utc>,
}
