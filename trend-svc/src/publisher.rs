//! Downstream publisher and monotonic merge
//!
//! Observations are merged into the durable aggregate under a rule that only
//! accepts strictly increasing traffic at or above a floor. Anything else is
//! dropped without mutation or event, which makes redelivered and noisy
//! re-observations harmless. Publishing is one non-blocking attempt per event.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trend_common::events::TrendEvent;
use trend_common::models::KeywordNotice;
use trend_common::{Clock, EnrichmentResult, TrendAggregate};

use crate::channel::{Channel, ChannelMessage, TOPIC_TREND_CREATED, TOPIC_TREND_KEYWORDS};
use crate::error::{Error, Result};
use crate::notify::NotificationHub;
use crate::repository::TrendRepository;
use crate::stats::CycleStats;

/// What `on_observation` did with one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting; aggregate created
    Created,
    /// Traffic high-water mark raised from `previous`
    Raised { previous: u64 },
    /// Not new, not higher, or below the floor
    Ignored,
}

pub struct Publisher {
    repository: Arc<dyn TrendRepository>,
    channel: Arc<dyn Channel>,
    hub: NotificationHub,
    stats: Arc<CycleStats>,
    clock: Arc<dyn Clock>,
    traffic_floor: u64,
    default_category: String,
}

impl Publisher {
    pub fn new(
        repository: Arc<dyn TrendRepository>,
        channel: Arc<dyn Channel>,
        hub: NotificationHub,
        stats: Arc<CycleStats>,
        clock: Arc<dyn Clock>,
        traffic_floor: u64,
        default_category: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            channel,
            hub,
            stats,
            clock,
            traffic_floor,
            default_category: default_category.into(),
        }
    }

    /// Merge one observation into its aggregate
    pub async fn on_observation(&self, keyword: &str, traffic_estimate: u64) -> Result<MergeOutcome> {
        let now = self.clock.now();
        let existing = match self.repository.find(keyword).await? {
            Some(existing) => existing,
            None => {
                if self.repository.insert_if_absent(keyword, traffic_estimate, now).await? {
                    info!(keyword, traffic = traffic_estimate, "New trend keyword");
                    self.send_notice(keyword, traffic_estimate, true);
                    self.hub.emit(TrendEvent::NewKeyword {
                        keyword: keyword.to_string(),
                        traffic: traffic_estimate,
                        timestamp: now,
                    });
                    return Ok(MergeOutcome::Created);
                }

                // Another writer created it first; merge against that row
                match self.repository.find(keyword).await? {
                    Some(existing) => existing,
                    None => return Ok(MergeOutcome::Ignored),
                }
            }
        };

        if traffic_estimate < self.traffic_floor || traffic_estimate <= existing.traffic {
            debug!(
                keyword,
                traffic = traffic_estimate,
                existing = existing.traffic,
                "Observation not above high-water mark, ignored"
            );
            return Ok(MergeOutcome::Ignored);
        }

        if !self
            .repository
            .raise_traffic(keyword, traffic_estimate, self.traffic_floor, now)
            .await?
        {
            debug!(keyword, traffic = traffic_estimate, "Concurrent raise won, ignored");
            return Ok(MergeOutcome::Ignored);
        }

        info!(keyword, previous = existing.traffic, traffic = traffic_estimate, "Trend traffic raised");
        self.send_notice(keyword, traffic_estimate, false);
        self.hub.emit(TrendEvent::TrendRaised {
            keyword: keyword.to_string(),
            previous: existing.traffic,
            traffic: traffic_estimate,
            timestamp: now,
        });
        Ok(MergeOutcome::Raised {
            previous: existing.traffic,
        })
    }

    /// Merge an enrichment result and announce the enriched record
    ///
    /// Traffic is never touched here. Category names outside the taxonomy are
    /// dropped; when none resolve, the configured default category is used.
    pub async fn on_enrichment(&self, result: EnrichmentResult) -> Result<TrendAggregate> {
        let requested: Vec<String> = result
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let mut categories = self.repository.resolve_sub_categories(&requested).await?;
        if categories.len() < requested.len() {
            debug!(keyword = %result.keyword, requested = ?requested, resolved = ?categories, "Unknown categories dropped");
        }
        if categories.is_empty() {
            categories = self
                .repository
                .resolve_sub_categories(std::slice::from_ref(&self.default_category))
                .await?;
            if categories.is_empty() {
                return Err(Error::Common(trend_common::Error::Config(format!(
                    "default category '{}' is not in the taxonomy",
                    self.default_category
                ))));
            }
        }

        let applied = self
            .repository
            .apply_enrichment(
                &result.keyword,
                &categories,
                result.summary.as_deref(),
                result.blog_post.as_deref(),
                self.clock.now(),
            )
            .await?;

        if !applied {
            warn!(keyword = %result.keyword, "Enrichment for unknown keyword dropped");
            return Err(Error::Common(trend_common::Error::NotFound(result.keyword)));
        }

        let aggregate = self
            .repository
            .find(&result.keyword)
            .await?
            .ok_or_else(|| Error::Common(trend_common::Error::NotFound(result.keyword.clone())))?;

        info!(keyword = %aggregate.keyword, categories = ?aggregate.sub_categories, "Enrichment merged");
        self.send(TOPIC_TREND_CREATED, &aggregate.keyword, &aggregate);
        self.hub.emit(TrendEvent::TrendCreated {
            keyword: aggregate.keyword.clone(),
            traffic: aggregate.traffic,
            timestamp: self.clock.now(),
        });
        Ok(aggregate)
    }

    fn send_notice(&self, keyword: &str, traffic: u64, created: bool) {
        let notice = KeywordNotice {
            keyword: keyword.to_string(),
            traffic,
            created,
            observed_at: self.clock.now(),
        };
        self.send(TOPIC_TREND_KEYWORDS, keyword, &notice);
    }

    fn send<T: Serialize>(&self, topic: &str, key: &str, payload: &T) {
        let message = match ChannelMessage::new(topic, key, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic, key, "Failed to encode channel message: {}", e);
                self.stats.record_dropped();
                return;
            }
        };

        match self.channel.publish(message) {
            Ok(()) => self.stats.record_published(),
            Err(e) => {
                self.stats.record_dropped();
                debug!(topic, key, "Publish not accepted: {}", e);
            }
        }
    }
}
