//! Server-Sent Events for hot-keyword notifications

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/v1/notifications/subscribe
///
/// Streams one `hot-keyword` event per detected burst, with a `ping`
/// keep-alive. Only events detected after connecting are delivered.
pub async fn subscribe(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    trend_common::sse::create_event_sse_stream("trend-svc", state.hub.subscribe(), Some("hot-keyword"))
}

pub fn notification_routes() -> Router<AppState> {
    Router::new().route("/api/v1/notifications/subscribe", get(subscribe))
}
