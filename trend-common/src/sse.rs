//! Server-Sent Events (SSE) utilities
//!
//! Converts EventBus subscriptions into axum SSE responses.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::events::TrendEvent;

/// Keep-alive interval; keeps idle connections open through proxies
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Render one event as an SSE frame
///
/// `hot-keyword` frames carry the bare keyword as data so that browser
/// clients can display it without parsing; other events carry JSON.
pub fn to_sse_event(event: &TrendEvent) -> Option<Event> {
    let frame = Event::default().event(event.event_type());
    match event {
        TrendEvent::HotKeyword { keyword, .. } => Some(frame.data(keyword)),
        other => frame.json_data(other).ok(),
    }
}

/// Create an SSE stream fed by an EventBus subscription
///
/// `only` restricts the stream to one named event type. Lagging clients skip
/// the events they missed; the stream ends when the bus is dropped.
pub fn create_event_sse_stream(
    service_name: &'static str,
    mut rx: broadcast::Receiver<TrendEvent>,
    only: Option<&'static str>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if only.is_some_and(|name| name != event.event_type()) {
                        continue;
                    }
                    if let Some(frame) = to_sse_event(&event) {
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: {} client lagged, events skipped", service_name);
                }
                Err(RecvError::Closed) => {
                    debug!("SSE: {} event bus closed", service_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(PING_INTERVAL).text("ping"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hot_keyword_frame_is_built() {
        let event = TrendEvent::hot_keyword("rust", 9, 3);
        assert!(to_sse_event(&event).is_some());
    }

    #[test]
    fn test_json_frame_is_built_for_other_events() {
        let event = TrendEvent::TrendCreated {
            keyword: "rust".to_string(),
            traffic: 2000,
            timestamp: chrono::Utc::now(),
        };
        assert!(to_sse_event(&event).is_some());
    }
}
