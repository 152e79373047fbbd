//! Trend pipeline cycle and its periodic scheduler
//!
//! One cycle: observe → log + sighting detail → bucket writes → merge/publish
//! → aggregate both windows → top-K → burst detection → hot-keyword fan-out.
//!
//! The scheduler is non-reentrant. A tick that fires while a cycle is still
//! running is skipped and counted, never queued. A cycle that outlives its
//! deadline is abandoned and the next tick starts fresh.

use chrono::FixedOffset;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use trend_common::config::TrendConfig;
use trend_common::events::TrendEvent;
use trend_common::{BucketKey, Clock, KeywordObservation, TopKeyword, WindowSpec};

use crate::burst::BurstDetector;
use crate::error::{Error, Result};
use crate::observer::Observer;
use crate::publisher::Publisher;
use crate::repository::TrendRepository;
use crate::stats::{CycleReport, CycleStats};
use crate::store::WindowedScoreStore;
use crate::top_k::{select_top_k, TopKSelector};
use crate::window::WindowAggregator;
use crate::notify::NotificationHub;

/// Collaborators a pipeline is built from
pub struct PipelineComponents {
    pub observer: Arc<dyn Observer>,
    pub store: Arc<WindowedScoreStore>,
    pub repository: Arc<dyn TrendRepository>,
    pub publisher: Arc<Publisher>,
    pub hub: NotificationHub,
    pub stats: Arc<CycleStats>,
    pub clock: Arc<dyn Clock>,
}

pub struct TrendPipeline {
    observer: Arc<dyn Observer>,
    store: Arc<WindowedScoreStore>,
    repository: Arc<dyn TrendRepository>,
    publisher: Arc<Publisher>,
    hub: NotificationHub,
    stats: Arc<CycleStats>,
    clock: Arc<dyn Clock>,
    aggregator: Arc<WindowAggregator>,
    selector: TopKSelector,
    detector: BurstDetector,
    zone: FixedOffset,
    recent: WindowSpec,
    past: WindowSpec,
    top_k: usize,
}

impl TrendPipeline {
    pub fn new(parts: PipelineComponents, config: &TrendConfig) -> Result<Self> {
        config.validate()?;
        let zone = config.zone()?;
        let recent = config.recent_window()?;
        let past = config.past_window()?;

        let aggregator = Arc::new(WindowAggregator::new(parts.store.clone(), zone));
        let selector = TopKSelector::new(aggregator.clone(), recent, past);

        Ok(Self {
            observer: parts.observer,
            store: parts.store,
            repository: parts.repository,
            publisher: parts.publisher,
            hub: parts.hub,
            stats: parts.stats,
            clock: parts.clock,
            aggregator,
            selector,
            detector: BurstDetector::new(config.burst_ratio),
            zone,
            recent,
            past,
            top_k: config.top_k,
        })
    }

    pub fn default_top_k(&self) -> usize {
        self.top_k
    }

    /// Current top-K listing, read on demand
    pub async fn top_k(&self, k: usize) -> Vec<TopKeyword> {
        self.selector.top_k(self.clock.now(), k).await
    }

    /// Run one full cycle
    ///
    /// Never fails as a whole: each stage logs its own failures and the cycle
    /// carries on with whatever it has.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = self.clock.now();
        let timer = Instant::now();

        let observations = match self.observer.observe().await {
            Ok(observations) => observations,
            Err(e) => {
                warn!("Observer failed, continuing with no observations: {}", e);
                self.stats.record_observer_failure();
                Vec::new()
            }
        };
        let observation_count = observations.len();

        join_all(observations.iter().map(|obs| self.ingest(obs))).await;
        self.stats.record_observations(observation_count);

        let now = self.clock.now();
        let recent = self.aggregator.aggregate_window(now, self.recent).await;
        let past = self.aggregator.aggregate_window(now, self.past).await;

        let top = select_top_k(&recent, &past, self.top_k);
        let hot = self.detector.detect(&recent, &past);

        for keyword in &hot {
            let r = recent.get(keyword).copied().unwrap_or(0);
            let p = past.get(keyword).copied().unwrap_or(0);
            let receivers = self.hub.broadcast_hot(keyword, r, p, now);
            info!(keyword = %keyword, recent = r, past = p, receivers, "Hot keyword detected");
        }

        if let Err(e) = self.store.purge_expired().await {
            warn!("Expired bucket purge failed: {}", e);
        }

        let duration_ms = timer.elapsed().as_millis() as u64;
        let report = CycleReport {
            started_at,
            observations: observation_count,
            top,
            hot: hot.into_iter().collect(),
            duration_ms,
        };

        self.hub.emit(TrendEvent::CycleCompleted {
            observations: report.observations,
            hot_keywords: report.hot.len(),
            duration_ms,
            timestamp: self.clock.now(),
        });
        self.stats.record_cycle(report.clone()).await;

        info!(
            observations = report.observations,
            hot = report.hot.len(),
            duration_ms,
            "Trend cycle complete"
        );
        report
    }

    /// Log, count and merge one observation
    ///
    /// Each step fails independently; a failed log append does not stop the
    /// bucket write.
    async fn ingest(&self, obs: &KeywordObservation) {
        if let Err(e) = self
            .repository
            .append_keyword_record(&obs.keyword, obs.traffic_estimate, obs.observed_at)
            .await
        {
            warn!(keyword = %obs.keyword, "Keyword log append failed: {}", e);
        }

        if let Err(e) = self.repository.record_sighting(obs).await {
            warn!(keyword = %obs.keyword, "Keyword detail update failed: {}", e);
        }

        let bucket = BucketKey::for_instant(obs.observed_at, self.zone);
        if let Err(e) = self.store.increment(&bucket, &obs.keyword, obs.traffic_estimate).await {
            warn!(keyword = %obs.keyword, bucket = %bucket, "Bucket write failed: {}", e);
        }

        if let Err(e) = self.publisher.on_observation(&obs.keyword, obs.traffic_estimate).await {
            warn!(keyword = %obs.keyword, "Publish merge failed: {}", e);
        }
    }
}

/// Result of one scheduler tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(CycleReport),
    /// Previous cycle still running
    Skipped,
    /// Cycle abandoned at its deadline
    TimedOut,
}

/// Clears the in-flight flag however the cycle ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    pipeline: Arc<TrendPipeline>,
    stats: Arc<CycleStats>,
    tick_interval: Duration,
    cycle_timeout: Duration,
    in_flight: AtomicBool,
}

impl Scheduler {
    pub fn new(pipeline: Arc<TrendPipeline>, stats: Arc<CycleStats>, tick_interval: Duration, cycle_timeout: Duration) -> Self {
        Self {
            pipeline,
            stats,
            tick_interval,
            cycle_timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_running_cycle(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run a cycle unless one is already in flight
    pub async fn try_run_cycle(&self) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.record_tick_skipped();
            warn!("Previous trend cycle still running, tick skipped");
            return TickOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        match tokio::time::timeout(self.cycle_timeout, self.pipeline.run_cycle()).await {
            Ok(report) => TickOutcome::Completed(report),
            Err(_) => {
                self.stats.record_timeout();
                warn!("Trend cycle abandoned: {}", Error::CycleTimeout(self.cycle_timeout));
                TickOutcome::TimedOut
            }
        }
    }

    /// Start the periodic trigger
    ///
    /// Every tick runs its cycle on a separate task, so the ticker itself
    /// never waits on a cycle and overruns surface as skipped ticks.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "Starting trend scheduler (interval: {:?}, cycle timeout: {:?})",
            self.tick_interval, self.cycle_timeout
        );

        tokio::spawn(async move {
            let mut timer = interval(self.tick_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                debug!("Scheduler tick");

                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    scheduler.try_run_cycle().await;
                });
            }
        })
    }
}
