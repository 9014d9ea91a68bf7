//! Server-sent event stream of dispatcher events.

use crate::server::AppContext;
use crate::state::{AppEvent, EventCategory};
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/events", get(stream_events))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only forward events of this category.
    category: Option<EventCategory>,
}

/// Encode one event. The SSE event name is the `event_type` of the payload.
fn encode(event: &AppEvent) -> Event {
    match serde_json::to_value(event) {
        Ok(json) => {
            let name = json["event_type"].as_str().unwrap_or("message").to_string();
            Event::default().event(name).data(json.to_string())
        }
        Err(e) => Event::default()
            .event("error")
            .data(format!(r#"{{"error":"serialization failed: {e}"}}"#)),
    }
}

async fn stream_events(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let wanted = query.category;

    let events = BroadcastStream::new(ctx.state.subscribe()).filter_map(move |received| {
        match received {
            Ok(event) if wanted.map_or(true, |c| event.category() == c) => Some(encode(&event)),
            Ok(_) => None,
            // A slow client loses events rather than holding up the dispatcher.
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::debug!(missed, "SSE client lagged behind the event bus");
                Some(
                    Event::default()
                        .event("lagged")
                        .data(format!(r#"{{"missed":{missed}}}"#)),
                )
            }
        }
    });

    let heartbeat = IntervalStream::new(tokio::time::interval(HEARTBEAT_INTERVAL))
        .map(|_| Event::default().event("heartbeat").data("{}"));

    let stream = stream::select(events, heartbeat).map(Ok::<_, Infallible>);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
