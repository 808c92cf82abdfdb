//! Server-Sent Events (SSE) stream
//!
//! Forwards every [`LecternEvent`] from the event bus, plus
//! `PlaybackProgress` built from the live position whenever it changes.
//! Position updates coalesce, so a slow client sees the latest position
//! rather than a backlog.

use crate::api::server::AppContext;
use crate::state::PositionSnapshot;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use lectern_common::LecternEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// GET /events
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let mut events = ctx.state.subscribe_events();
    let mut position = ctx.state.live_position.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            let event = tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE client lagged, {} events skipped", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = position.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = position.borrow_and_update().clone();
                    match progress_event(snapshot) {
                        Some(event) => event,
                        None => continue,
                    }
                }
            };

            match sse_event(&event) {
                Some(sse) => yield Ok(sse),
                None => continue,
            }
        }

        debug!("SSE stream closed");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Progress event for a snapshot that refers to a sentence
fn progress_event(snapshot: PositionSnapshot) -> Option<LecternEvent> {
    let sentence_id = snapshot.sentence_id?;
    Some(LecternEvent::PlaybackProgress {
        sentence_id,
        progress: snapshot.progress,
        read_pos: snapshot.read_pos,
        write_pos: snapshot.write_pos,
        samples_consumed: snapshot.samples_consumed,
        timestamp: chrono::Utc::now(),
    })
}

fn sse_event(event: &LecternEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
