//! Event types for the trend event system
//!
//! Provides the shared event definitions and the EventBus used to fan events
//! out to connected subscribers (SSE clients, in-process listeners).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Trend pipeline events
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission. Delivery is best-effort: a subscriber only sees events sent
/// after it subscribed, and there is no replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrendEvent {
    /// A keyword burst was detected in the latest cycle
    ///
    /// Triggers:
    /// - SSE: `hot-keyword` named event to every connected client
    HotKeyword {
        keyword: String,
        /// Summed score over the recent window
        recent_score: u64,
        /// Summed score over the preceding window
        past_score: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A keyword was seen for the first time and its aggregate created
    NewKeyword {
        keyword: String,
        traffic: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Enrichment was merged into an aggregate
    TrendCreated {
        keyword: String,
        traffic: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An existing aggregate's traffic high-water mark was raised
    TrendRaised {
        keyword: String,
        previous: u64,
        traffic: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One ingest→aggregate→detect→publish cycle finished
    CycleCompleted {
        observations: usize,
        hot_keywords: usize,
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TrendEvent {
    /// Named SSE event for this variant
    pub fn event_type(&self) -> &'static str {
        match self {
            TrendEvent::HotKeyword { .. } => "hot-keyword",
            TrendEvent::NewKeyword { .. } => "new-keyword",
            TrendEvent::TrendCreated { .. } => "trend-created",
            TrendEvent::TrendRaised { .. } => "trend-raised",
            TrendEvent::CycleCompleted { .. } => "cycle-completed",
        }
    }

    /// Create a HotKeyword event stamped with the current time
    pub fn hot_keyword(keyword: impl Into<String>, recent_score: u64, past_score: u64) -> Self {
        TrendEvent::HotKeyword {
            keyword: keyword.into(),
            recent_score,
            past_score,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use trend_common::events::{EventBus, TrendEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit(TrendEvent::hot_keyword("rust", 900, 100)).ok();
/// assert_eq!(rx.try_recv().unwrap().event_type(), "hot-keyword");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrendEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for that subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TrendEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: TrendEvent) -> Result<usize, broadcast::error::SendError<TrendEvent>> {
        self.tx.send(event)
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        assert!(bus.emit(TrendEvent::hot_keyword("rust", 9, 3)).is_err());
    }

    #[test]
    fn test_subscriber_only_sees_later_events() {
        let bus = EventBus::new(10);
        let _early = bus.subscribe();
        bus.emit(TrendEvent::hot_keyword("before", 9, 3)).unwrap();

        let mut late = bus.subscribe();
        bus.emit(TrendEvent::hot_keyword("after", 9, 3)).unwrap();

        match late.try_recv().unwrap() {
            TrendEvent::HotKeyword { keyword, .. } => assert_eq!(keyword, "after"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.emit(TrendEvent::hot_keyword("rust", 9, 3)).unwrap(), 2);
        assert_eq!(rx1.try_recv().unwrap().event_type(), "hot-keyword");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "hot-keyword");
    }

    #[test]
    fn test_slow_subscriber_lags_on_full_channel() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.emit(TrendEvent::hot_keyword(format!("k{i}"), 9, 3)).unwrap();
        }
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Lagged(3))));
        assert_eq!(rx.try_recv().unwrap().event_type(), "hot-keyword");
    }

    #[test]
    fn test_event_serialization_tag() {
        let json = serde_json::to_value(TrendEvent::hot_keyword("rust", 9, 3)).unwrap();
        assert_eq!(json["type"], "HotKeyword");
        assert_eq!(json["keyword"], "rust");
    }
}
