//! Stream relay.
//!
//! Bridges an upstream [`FragmentStream`] to the caller's SSE stream: one
//! `{"text": ...}` event per fragment in arrival order, and at most one
//! terminal `{"error": ...}` event. Nothing is buffered beyond the fragment
//! in flight.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::upstream::FragmentStream;

/// Payload of one outbound SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayEvent {
    Text(String),
    Error(String),
}

impl RelayEvent {
    /// Encode as an SSE event whose data is the JSON payload.
    pub fn into_sse(self) -> Event {
        Event::default().json_data(&self).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode relay event");
            Event::default().data(r#"{"error":"failed to encode event"}"#)
        })
    }
}

struct RelayState {
    fragments: FragmentStream,
    pacing: Duration,
    emitted: usize,
    finished: bool,
}

/// Relay fragments as events, pausing `pacing` between successive events.
///
/// The first upstream error becomes a single `Error` event and ends the
/// relay. Dropping the returned stream drops `fragments` and with it the
/// upstream connection.
pub fn relay(fragments: FragmentStream, pacing: Duration) -> impl Stream<Item = RelayEvent> + Send {
    let state = RelayState {
        fragments,
        pacing,
        emitted: 0,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let event = match state.fragments.next().await {
            Some(Ok(text)) => RelayEvent::Text(text),
            Some(Err(e)) => {
                tracing::error!(error = %e, emitted = state.emitted, "Stream relay aborted by upstream error");
                state.finished = true;
                RelayEvent::Error(e.to_string())
            }
            None => {
                tracing::info!(emitted = state.emitted, "Stream relay completed");
                return None;
            }
        };

        if state.emitted > 0 && !state.pacing.is_zero() {
            tokio::time::sleep(state.pacing).await;
        }
        state.emitted += 1;
        Some((event, state))
    })
}

/// [`relay`] encoded for `axum::response::Sse`.
pub fn sse_events(
    fragments: FragmentStream,
    pacing: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    relay(fragments, pacing).map(|event| Ok(event.into_sse()))
}
