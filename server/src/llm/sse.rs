//! Provider SSE response → `ChatStream`.
//!
//! DESIGN
//! ======
//! Line framing is shared (`lume_protocol::sse::SseLineBuffer`); each
//! provider supplies an `EventParser` that turns one `data:` payload into
//! zero or more `StreamEvent`s and may emit trailing events when the byte
//! stream ends. Events from one network chunk are queued and drained before
//! the next chunk is read, so nothing is dropped when several SSE events
//! share a chunk.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use lume_protocol::sse::{SseEvent, SseLineBuffer};

use super::types::{ChatStream, LlmError, StreamEvent};

pub(crate) trait EventParser: Send + 'static {
    /// Parse one `data:` payload.
    fn parse(&mut self, data: &str) -> Result<Vec<StreamEvent>, LlmError>;

    /// Events to emit once the byte stream is exhausted.
    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

struct SseState<P> {
    bytes: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    lines: SseLineBuffer,
    parser: P,
    pending: VecDeque<Result<StreamEvent, LlmError>>,
    ended: bool,
}

impl<P: EventParser> SseState<P> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Data(data) => match self.parser.parse(&data) {
                    Ok(parsed) => self.pending.extend(parsed.into_iter().map(Ok)),
                    Err(e) => {
                        self.pending.push_back(Err(e));
                        self.ended = true;
                        return;
                    }
                },
                SseEvent::Done => {}
            }
        }
    }

    fn end(&mut self) {
        self.ended = true;
        let tail = self.lines.flush();
        self.absorb(tail);
        let trailing = self.parser.finish();
        self.pending.extend(trailing.into_iter().map(Ok));
    }
}

/// Wrap a successful streaming HTTP response.
pub(crate) fn event_stream<P: EventParser>(response: reqwest::Response, parser: P) -> ChatStream {
    let state = SseState {
        bytes: response.bytes_stream().boxed(),
        lines: SseLineBuffer::new(),
        parser,
        pending: VecDeque::new(),
        ended: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.ended {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.lines.feed(&chunk);
                    state.absorb(events);
                }
                Some(Err(e)) => {
                    state.ended = true;
                    let kind = if e.is_timeout() { "timeout" } else { "read" };
                    return Some((Err(LlmError::Stream { kind: kind.into(), message: e.to_string() }), state));
                }
                None => state.end(),
            }
        }
    });

    Box::pin(events)
}

/// Turn a non-success response into `LlmError::ApiResponse`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::ApiResponse { status, body })
}
