//! Notification fan-out to connected subscribers
//!
//! Best-effort: a subscriber only sees events sent after it subscribed, and a
//! send with nobody listening is dropped.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;
use trend_common::events::{EventBus, TrendEvent};

#[derive(Clone)]
pub struct NotificationHub {
    bus: EventBus,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            bus: EventBus::new(capacity),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrendEvent> {
        self.bus.subscribe()
    }

    /// Push one `hot-keyword` event; returns how many subscribers got it
    pub fn broadcast_hot(
        &self,
        keyword: &str,
        recent_score: u64,
        past_score: u64,
        at: DateTime<Utc>,
    ) -> usize {
        self.emit(TrendEvent::HotKeyword {
            keyword: keyword.to_string(),
            recent_score,
            past_score,
            timestamp: at,
        })
    }

    /// Push any event; returns how many subscribers got it
    pub fn emit(&self, event: TrendEvent) -> usize {
        match self.bus.emit(event) {
            Ok(receivers) => receivers,
            Err(dropped) => {
                debug!(event = dropped.0.event_type(), "No subscribers, notification dropped");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}
