//! Cycle counters and the last cycle report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use trend_common::TopKeyword;

/// Outcome of one completed cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub observations: usize,
    pub top: Vec<TopKeyword>,
    pub hot: Vec<String>,
    pub duration_ms: u64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles_completed: u64,
    pub ticks_skipped: u64,
    pub cycles_timed_out: u64,
    pub observer_failures: u64,
    pub observations_ingested: u64,
    pub events_published: u64,
    pub events_dropped: u64,
}

#[derive(Debug, Default)]
pub struct CycleStats {
    cycles_completed: AtomicU64,
    ticks_skipped: AtomicU64,
    cycles_timed_out: AtomicU64,
    observer_failures: AtomicU64,
    observations_ingested: AtomicU64,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
    last_report: RwLock<Option<CycleReport>>,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.cycles_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observer_failure(&self) {
        self.observer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observations(&self, count: usize) {
        self.observations_ingested.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed cycle and keep its report
    pub async fn record_cycle(&self, report: CycleReport) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_report.write().await = Some(report);
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            cycles_timed_out: self.cycles_timed_out.load(Ordering::Relaxed),
            observer_failures: self.observer_failures.load(Ordering::Relaxed),
            observations_ingested: self.observations_ingested.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}
