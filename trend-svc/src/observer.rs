//! Observer adapters
//!
//! An observer yields the latest batch of keyword sightings. Returning an
//! empty batch is normal; transport failures are returned as errors and the
//! scheduler turns them into a zero-observation cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use trend_common::{Clock, KeywordObservation};

use crate::error::{Error, Result};

#[async_trait]
pub trait Observer: Send + Sync {
    async fn observe(&self) -> Result<Vec<KeywordObservation>>;
}

/// Returns the same batch on every call
#[derive(Debug, Clone, Default)]
pub struct StaticObserver {
    batch: Vec<KeywordObservation>,
}

impl StaticObserver {
    pub fn new(batch: Vec<KeywordObservation>) -> Self {
        Self { batch }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Observer for StaticObserver {
    async fn observe(&self) -> Result<Vec<KeywordObservation>> {
        Ok(self.batch.clone())
    }
}

/// Traffic as reported by the crawler: a number or a display string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TrafficField {
    Count(u64),
    Display(String),
}

impl TrafficField {
    fn estimate(&self) -> u64 {
        match self {
            TrafficField::Count(n) => *n,
            TrafficField::Display(s) => parse_traffic_estimate(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrawlerNews {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CrawlerItem {
    keyword: String,
    traffic: TrafficField,
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "newsItems")]
    news_items: Vec<CrawlerNews>,
}

/// Polls a crawler sidecar over HTTP
///
/// Expects a JSON array of `{keyword, traffic, observed_at?, news_items?}`.
/// Items without a timestamp are stamped with the poll time.
pub struct HttpObserver {
    client: reqwest::Client,
    url: String,
    clock: Arc<dyn Clock>,
}

impl HttpObserver {
    pub fn new(url: impl Into<String>, timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            clock,
        })
    }
}

#[async_trait]
impl Observer for HttpObserver {
    async fn observe(&self) -> Result<Vec<KeywordObservation>> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Observer(format!("{} returned {}", self.url, status)));
        }

        let items: Vec<CrawlerItem> = response.json().await?;
        let polled_at = self.clock.now();

        let observations: Vec<KeywordObservation> = items
            .into_iter()
            .filter_map(|item| {
                let traffic = item.traffic.estimate();
                let urls: Vec<String> = item.news_items.into_iter().map(|n| n.url).collect();
                match KeywordObservation::new(&item.keyword, traffic, item.observed_at.unwrap_or(polled_at)) {
                    Ok(obs) => Some(obs.with_news_urls(urls)),
                    Err(e) => {
                        debug!("Skipping crawler item: {}", e);
                        None
                    }
                }
            })
            .collect();

        info!(count = observations.len(), "Observer poll complete");
        Ok(observations)
    }
}

/// Parse a displayed traffic figure into a count
///
/// Understands plain and comma-grouped numbers, `K`/`M`/`B` suffixes and the
/// Korean units `천` (10³), `만` (10⁴) and `억` (10⁸), with arbitrary text
/// around the figure: `"2,000+"`, `"1.5M+"`, `"검색 2천+회"`. Anything
/// without a readable number is 0.
pub fn parse_traffic_estimate(raw: &str) -> u64 {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();

    let Some(start) = cleaned.find(|c: char| c.is_ascii_digit()) else {
        return 0;
    };
    let rest = &cleaned[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());

    let Ok(number) = rest[..end].parse::<f64>() else {
        return 0;
    };

    let multiplier = match rest[end..].chars().next() {
        Some('K' | 'k' | '천') => 1e3,
        Some('만') => 1e4,
        Some('M' | 'm') => 1e6,
        Some('억') => 1e8,
        Some('B' | 'b') => 1e9,
        _ => 1.0,
    };

    (number * multiplier).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_grouped() {
        assert_eq!(parse_traffic_estimate("2000"), 2000);
        assert_eq!(parse_traffic_estimate("2,000+"), 2000);
        assert_eq!(parse_traffic_estimate(" 12 "), 12);
    }

    #[test]
    fn test_parse_latin_suffixes() {
        assert_eq!(parse_traffic_estimate("20K+"), 20_000);
        assert_eq!(parse_traffic_estimate("1.5M+"), 1_500_000);
        assert_eq!(parse_traffic_estimate("2B"), 2_000_000_000);
    }

    #[test]
    fn test_parse_korean_units() {
        assert_eq!(parse_traffic_estimate("검색 2천+회"), 2000);
        assert_eq!(parse_traffic_estimate("3만+"), 30_000);
        assert_eq!(parse_traffic_estimate("1억"), 100_000_000);
    }

    #[test]
    fn test_parse_unreadable_is_zero() {
        assert_eq!(parse_traffic_estimate(""), 0);
        assert_eq!(parse_traffic_estimate("N/A"), 0);
        assert_eq!(parse_traffic_estimate("1.2.3K"), 0);
    }

    #[test]
    fn test_crawler_item_accepts_number_or_string() {
        let items: Vec<CrawlerItem> =
            serde_json::from_str(r#"[{"keyword":"a","traffic":500},{"keyword":"b","traffic":"20K+"}]"#).unwrap();
        assert_eq!(items[0].traffic.estimate(), 500);
        assert_eq!(items[1].traffic.estimate(), 20_000);
        assert!(items[0].observed_at.is_none());
        assert!(items[0].news_items.is_empty());
    }

    #[test]
    fn test_crawler_item_reads_news_urls() {
        let items: Vec<CrawlerItem> = serde_json::from_str(
            r#"[{"keyword":"a","traffic":"2K+","newsItems":[{"url":"https://x.example/1","title":"t"},{"url":"https://x.example/2"}]}]"#,
        )
        .unwrap();
        let urls: Vec<&str> = items[0].news_items.iter().map(|n| n.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.example/1", "https://x.example/2"]);
    }

    #[tokio::test]
    async fn test_static_observer_repeats_batch() {
        let obs = KeywordObservation::new("rust", 10, Utc::now()).unwrap();
        let observer = StaticObserver::new(vec![obs.clone()]);
        assert_eq!(observer.observe().await.unwrap(), vec![obs.clone()]);
        assert_eq!(observer.observe().await.unwrap(), vec![obs]);
        assert!(StaticObserver::empty().observe().await.unwrap().is_empty());
    }
}
