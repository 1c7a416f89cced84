//! Server-Sent Events (SSE) for real-time updates.
//!
//! Staff follow their business topic; table clients follow their table.

#![allow(missing_docs)]

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{self, Stream};
use mozo_core::{LocalEventBus, RealtimeEvent, topics};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::{extractors::StaffProfile, middleware::AppState};

/// Render an event for the wire.
fn to_sse_event(event: &RealtimeEvent) -> Event {
    Event::default()
        .json_data(event.to_wire())
        .unwrap_or_else(|_| Event::default().data("error"))
}

/// Events of one topic, preceded by a `connected` event.
pub fn topic_stream(
    events: &LocalEventBus,
    topic: String,
) -> impl Stream<Item = Result<Event, Infallible>> + use<> {
    let initial = stream::once({
        let topic = topic.clone();
        async move { Ok(Event::default().event("connected").data(topic)) }
    });

    // Lagged receivers skip the missed events; clients refetch.
    let updates = BroadcastStream::new(events.subscribe()).filter_map(move |result| {
        result
            .ok()
            .filter(|event| event.matches_topic(&topic))
            .map(|event| Ok(to_sse_event(&event)))
    });

    initial.chain(updates)
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(30))
        .text("ping")
}

/// Every call and silence event of the staff member's business.
async fn business_stream(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topic = topics::business(staff.business_id());
    tracing::debug!(user_id = %staff.id(), topic = %topic, "SSE subscriber connected");

    Sse::new(topic_stream(&state.events, topic)).keep_alive(keep_alive())
}

/// Events of one table. Public, for the table's own session.
async fn table_stream(
    Path(table_id): Path<String>,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topic = topics::table(&table_id);
    Sse::new(topic_stream(&state.events, topic)).keep_alive(keep_alive())
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/business", get(business_stream))
        .route("/table/{id}", get(table_stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mozo_core::SilenceEvent;

    fn silence_event(table_id: &str) -> RealtimeEvent {
        RealtimeEvent::SilenceChanged(SilenceEvent {
            table_id: table_id.to_string(),
            business_id: "b1".to_string(),
            silenced: true,
            reason: None,
            expires_at: Some(Utc::now()),
        })
    }

    #[tokio::test]
    async fn test_topic_stream_filters_by_table() {
        let bus = LocalEventBus::new(16);
        let stream = topic_stream(&bus, topics::table("t5"));
        tokio::pin!(stream);

        // connected
        assert!(stream.next().await.is_some());

        bus.send(silence_event("t6"));
        bus.send(silence_event("t5"));
        drop(bus);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_business_topic_receives_every_table() {
        let bus = LocalEventBus::new(16);
        let stream = topic_stream(&bus, topics::business("b1"));
        tokio::pin!(stream);
        stream.next().await;

        bus.send(silence_event("t5"));
        bus.send(silence_event("t6"));
        drop(bus);

        let mut received = 0;
        while stream.next().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 2);
    }
}
