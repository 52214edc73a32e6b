use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::stream::{Stream, StreamExt};
use marquee_shared::BookingEvent;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/celebrities/{id}/stream", get(celebrity_stream))
}

fn to_sse(event: &BookingEvent) -> Option<Event> {
    match Event::default().event(event.topic()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::warn!("dropping unserializable event: {}", e);
            None
        }
    }
}

/// GET /v1/celebrities/{id}/stream
/// Live booking events for one celebrity's calendar
async fn celebrity_stream(
    State(state): State<AppState>,
    Path(celebrity_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.celebrity_id() == celebrity_id => to_sse(&event).map(Ok),
            Ok(_) => None,
            // Lagged subscriber: skip what was missed
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
