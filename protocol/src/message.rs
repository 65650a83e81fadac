//! Chat messages and their typed parts.
//!
//! DESIGN
//! ======
//! A message is an ordered list of heterogeneous parts. Parts are a closed
//! enum with a `type` discriminant so every consumer (renderer, persistence,
//! provider replay) matches exhaustively. Message ids are namespaced by who
//! minted them: clients use `client-`, the server uses `msg-`, so the two id
//! spaces never collide.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Id prefix for messages minted by a client.
pub const CLIENT_MESSAGE_PREFIX: &str = "client-";

/// Id prefix for messages minted by the server.
pub const SERVER_MESSAGE_PREFIX: &str = "msg-";

/// Mint a fresh client-side message id.
#[must_use]
pub fn client_message_id() -> String {
    format!("{CLIENT_MESSAGE_PREFIX}{}", Uuid::new_v4().simple())
}

/// Mint a fresh server-side message id.
#[must_use]
pub fn server_message_id() -> String {
    format!("{SERVER_MESSAGE_PREFIX}{}", Uuid::new_v4().simple())
}

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

// =============================================================================
// PARTS
// =============================================================================

/// Lifecycle of a tool call part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    /// Input JSON is still arriving from the model.
    InputStreaming,
    /// Input is complete; the tool has not produced output yet.
    InputAvailable,
    /// The tool ran and produced output.
    OutputAvailable,
    /// The tool failed; `error_text` carries the reason.
    OutputError,
}

/// One typed segment of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MessagePart {
    /// Plain text.
    Text { text: String },

    /// Model reasoning ("thinking") text. Rendered, never replayed.
    Reasoning { text: String },

    /// A file attachment referenced by URL (often a data URL).
    File {
        media_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// A cited source, usually produced by web search.
    SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    /// A tool call with its typed input and, once run, its output.
    Tool {
        tool_call_id: String,
        tool_name: String,
        state: ToolState,
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_text: Option<String>,
    },

    /// A named custom data event (e.g. an artifact reference).
    Data {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        data: Value,
    },

    /// Boundary between provider steps of one assistant turn.
    StepStart,
}

impl MessagePart {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Discriminant as it appears on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::File { .. } => "file",
            Self::SourceUrl { .. } => "source-url",
            Self::Tool { .. } => "tool",
            Self::Data { .. } => "data",
            Self::StepStart => "step-start",
        }
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A chat message as exchanged with clients and stored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl UiMessage {
    /// Build a user message with a single text part and a client-minted id.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { id: client_message_id(), role: Role::User, parts: vec![MessagePart::text(text)] }
    }

    /// Concatenate every text part.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn is_client_minted(&self) -> bool {
        self.id.starts_with(CLIENT_MESSAGE_PREFIX)
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
