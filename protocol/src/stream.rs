//! Stream parts relayed over SSE during a chat turn, and the fold that turns
//! them back into a message.
//!
//! DESIGN
//! ======
//! The server emits a flat sequence of `StreamPart`s; text, reasoning and
//! tool input arrive as start/delta/end triples keyed by an id. Both ends
//! fold that sequence with the same `MessageAssembler`, so the message the
//! server persists is exactly the message the client rendered.
//!
//! Transient `data` parts (e.g. a freshly generated title) are delivered to
//! the client but never become message parts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{MessagePart, Role, ToolState, UiMessage};

/// Payload of the final SSE event of a turn.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One SSE event of a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamPart {
    Start {
        message_id: String,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    ToolInputStart {
        tool_call_id: String,
        tool_name: String,
    },
    /// Raw JSON text fragment of the tool input.
    ToolInputDelta {
        tool_call_id: String,
        input_text_delta: String,
    },
    /// Best-effort parse of the input received so far.
    ToolInputPartial {
        tool_call_id: String,
        input: Value,
    },
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Data {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        data: Value,
        #[serde(default)]
        transient: bool,
    },
    FinishStep,
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    Error {
        error_text: String,
        code: String,
        #[serde(default)]
        retryable: bool,
    },
}

impl StreamPart {
    #[must_use]
    pub fn error(code: &str, error_text: impl Into<String>, retryable: bool) -> Self {
        Self::Error { error_text: error_text.into(), code: code.to_owned(), retryable }
    }

    /// JSON payload for one `data:` line.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; every variant is plain data, so this
    /// only fails on non-finite floats inside a `Value`.
    pub fn to_sse_data(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

// =============================================================================
// ASSEMBLER
// =============================================================================

/// Folds stream parts into a `UiMessage`.
#[derive(Debug, Clone)]
pub struct MessageAssembler {
    id: String,
    parts: Vec<MessagePart>,
    open_text: HashMap<String, usize>,
    open_reasoning: HashMap<String, usize>,
    tools: HashMap<String, usize>,
    finished: bool,
    finish_reason: Option<String>,
    error: Option<String>,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parts: Vec::new(),
            open_text: HashMap::new(),
            open_reasoning: HashMap::new(),
            tools: HashMap::new(),
            finished: false,
            finish_reason: None,
            error: None,
        }
    }

    pub fn apply(&mut self, part: &StreamPart) {
        match part {
            StreamPart::Start { message_id } => self.id.clone_from(message_id),
            StreamPart::StartStep => self.parts.push(MessagePart::StepStart),
            StreamPart::TextStart { id } => {
                self.open_text.insert(id.clone(), self.parts.len());
                self.parts.push(MessagePart::Text { text: String::new() });
            }
            StreamPart::TextDelta { id, delta } => self.append_text(id, delta, false),
            StreamPart::TextEnd { id } => {
                self.open_text.remove(id);
            }
            StreamPart::ReasoningStart { id } => {
                self.open_reasoning.insert(id.clone(), self.parts.len());
                self.parts.push(MessagePart::Reasoning { text: String::new() });
            }
            StreamPart::ReasoningDelta { id, delta } => self.append_text(id, delta, true),
            StreamPart::ReasoningEnd { id } => {
                self.open_reasoning.remove(id);
            }
            StreamPart::ToolInputStart { tool_call_id, tool_name } => {
                self.tools.insert(tool_call_id.clone(), self.parts.len());
                self.parts.push(MessagePart::Tool {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    state: ToolState::InputStreaming,
                    input: Value::Null,
                    output: None,
                    error_text: None,
                });
            }
            StreamPart::ToolInputDelta { .. } => {}
            StreamPart::ToolInputPartial { tool_call_id, input } => {
                if let Some(MessagePart::Tool { input: slot, state: ToolState::InputStreaming, .. }) =
                    self.tool_mut(tool_call_id)
                {
                    slot.clone_from(input);
                }
            }
            StreamPart::ToolInputAvailable { tool_call_id, tool_name, input } => {
                if let Some(MessagePart::Tool { input: slot, state, .. }) = self.tool_mut(tool_call_id) {
                    slot.clone_from(input);
                    *state = ToolState::InputAvailable;
                } else {
                    self.tools.insert(tool_call_id.clone(), self.parts.len());
                    self.parts.push(MessagePart::Tool {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: tool_name.clone(),
                        state: ToolState::InputAvailable,
                        input: input.clone(),
                        output: None,
                        error_text: None,
                    });
                }
            }
            StreamPart::ToolOutputAvailable { tool_call_id, output } => {
                if let Some(MessagePart::Tool { output: slot, state, .. }) = self.tool_mut(tool_call_id) {
                    *slot = Some(output.clone());
                    *state = ToolState::OutputAvailable;
                }
            }
            StreamPart::ToolOutputError { tool_call_id, error_text } => {
                if let Some(MessagePart::Tool { error_text: slot, state, .. }) = self.tool_mut(tool_call_id) {
                    *slot = Some(error_text.clone());
                    *state = ToolState::OutputError;
                }
            }
            StreamPart::SourceUrl { source_id, url, title } => {
                self.parts.push(MessagePart::SourceUrl {
                    source_id: source_id.clone(),
                    url: url.clone(),
                    title: title.clone(),
                });
            }
            StreamPart::Data { transient: true, .. } => {}
            StreamPart::Data { name, id, data, transient: false } => self.upsert_data(name, id.as_ref(), data),
            StreamPart::FinishStep => {
                self.open_text.clear();
                self.open_reasoning.clear();
            }
            StreamPart::Finish { finish_reason } => {
                self.finished = true;
                self.finish_reason.clone_from(finish_reason);
            }
            StreamPart::Error { error_text, .. } => self.error = Some(error_text.clone()),
        }
    }

    fn append_text(&mut self, id: &str, delta: &str, reasoning: bool) {
        let open = if reasoning { &mut self.open_reasoning } else { &mut self.open_text };
        let index = match open.get(id) {
            Some(index) => *index,
            None => {
                // Delta without a start implicitly opens the part.
                let index = self.parts.len();
                open.insert(id.to_owned(), index);
                self.parts.push(if reasoning {
                    MessagePart::Reasoning { text: String::new() }
                } else {
                    MessagePart::Text { text: String::new() }
                });
                index
            }
        };
        if let Some(MessagePart::Text { text } | MessagePart::Reasoning { text }) = self.parts.get_mut(index) {
            text.push_str(delta);
        }
    }

    fn tool_mut(&mut self, tool_call_id: &str) -> Option<&mut MessagePart> {
        let index = *self.tools.get(tool_call_id)?;
        self.parts.get_mut(index)
    }

    fn upsert_data(&mut self, name: &str, id: Option<&String>, data: &Value) {
        if let Some(id) = id {
            let existing = self.parts.iter_mut().find(|part| {
                matches!(part, MessagePart::Data { name: n, id: Some(i), .. } if n == name && i == id)
            });
            if let Some(MessagePart::Data { data: slot, .. }) = existing {
                slot.clone_from(data);
                return;
            }
        }
        self.parts.push(MessagePart::Data { name: name.to_owned(), id: id.cloned(), data: data.clone() });
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }

    /// Snapshot of the assistant message assembled so far.
    #[must_use]
    pub fn message(&self) -> UiMessage {
        UiMessage { id: self.id.clone(), role: Role::Assistant, parts: self.parts.clone() }
    }

    #[must_use]
    pub fn into_message(self) -> UiMessage {
        UiMessage { id: self.id, role: Role::Assistant, parts: self.parts }
    }

    /// True once anything beyond step markers and empty text has arrived.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.parts.iter().any(|part| match part {
            MessagePart::StepStart => false,
            MessagePart::Text { text } | MessagePart::Reasoning { text } => !text.is_empty(),
            _ => true,
        })
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;
