//! Line buffering for Server-Sent Events.
//!
//! Network chunks do not line up with SSE events: one chunk may carry several
//! events, and one event (or one UTF-8 character) may be split across chunks.
//! Bytes are buffered until a full `\n`-terminated line is available, and only
//! then decoded.
//!
//! Used by the server to read provider streams and by the client to read the
//! chat stream.

use std::mem;

use crate::stream::DONE_SENTINEL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the prefix stripped.
    Data(String),
    /// The `[DONE]` terminator.
    Done,
}

#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Drain a trailing unterminated line at end of stream.
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let rest = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\n', '\r']);
    // event:, id:, retry: and comments carry nothing we use.
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }
    if data.trim().is_empty() {
        return None;
    }
    Some(SseEvent::Data(data.to_owned()))
}
