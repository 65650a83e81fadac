//! `POST /api/chat`: stream one chat turn as server-sent events.
//!
//! Each stream part is one `data:` event holding its JSON; the stream ends
//! with `data: [DONE]`. Setup failures are ordinary JSON error responses;
//! anything after the first byte travels in-band as an `error` part.

use std::convert::Infallible;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream};
use lume_protocol::stream::DONE_SENTINEL;
use lume_protocol::{ChatTurnRequest, StreamPart};
use tracing::warn;

use super::caller::Caller;
use super::error::ApiError;
use crate::services::chat;
use crate::state::AppState;

pub async fn chat(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    let parts = chat::start_turn(&state, caller, request).await?;
    let events = parts
        .map(|part| Ok(to_event(&part)))
        .chain(stream::once(async { Ok(Event::default().data(DONE_SENTINEL)) }));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_event(part: &StreamPart) -> Event {
    match part.to_sse_data() {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            warn!(error = %e, "chat: stream part not serializable");
            let fallback = StreamPart::error("E_SERIALIZE", "stream part could not be encoded", false);
            Event::default().data(fallback.to_sse_data().unwrap_or_default())
        }
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
