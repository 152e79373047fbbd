//! Top-K selection with backfill
//!
//! The recent window is ranked first. When it holds fewer than `k` distinct
//! keywords the list is topped up from the preceding window, skipping
//! keywords already selected. Equal scores are ordered by keyword so the
//! listing is stable between calls.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::sync::Arc;
use trend_common::{TopKeyword, WindowSpec};

use crate::window::{WindowAggregator, WindowScore};

fn ranked(scores: &WindowScore) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = scores.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by_key(|&(keyword, score)| (Reverse(score), keyword));
    entries
}

/// Rank `recent`, backfilling from `past` until `k` entries or `past` runs out
///
/// Never pads: fewer than `k` entries come back only when the two windows
/// together hold fewer than `k` distinct keywords.
pub fn select_top_k(recent: &WindowScore, past: &WindowScore, k: usize) -> Vec<TopKeyword> {
    let mut selected: Vec<TopKeyword> = ranked(recent)
        .into_iter()
        .take(k)
        .map(|(keyword, traffic)| TopKeyword {
            keyword: keyword.to_string(),
            traffic,
        })
        .collect();

    if selected.len() < k {
        let backfill: Vec<TopKeyword> = ranked(past)
            .into_iter()
            .filter(|(keyword, _)| !recent.contains_key(*keyword))
            .take(k - selected.len())
            .map(|(keyword, traffic)| TopKeyword {
                keyword: keyword.to_string(),
                traffic,
            })
            .collect();
        selected.extend(backfill);
    }

    selected
}

/// Reads the windows and ranks them on demand
pub struct TopKSelector {
    aggregator: Arc<WindowAggregator>,
    recent: WindowSpec,
    past: WindowSpec,
}

impl TopKSelector {
    pub fn new(aggregator: Arc<WindowAggregator>, recent: WindowSpec, past: WindowSpec) -> Self {
        Self {
            aggregator,
            recent,
            past,
        }
    }

    /// Top `k` keywords as of `now`; the past window is read only when needed
    pub async fn top_k(&self, now: DateTime<Utc>, k: usize) -> Vec<TopKeyword> {
        let recent = self.aggregator.aggregate_window(now, self.recent).await;
        if recent.len() >= k {
            return select_top_k(&recent, &WindowScore::new(), k);
        }

        let past = self.aggregator.aggregate_window(now, self.past).await;
        select_top_k(&recent, &past, k)
    }
}
