//! LLM types: provider-neutral messages, stream events and errors.
//!
//! Shared by the Anthropic and `OpenAI`-compatible clients. The orchestrator
//! only ever sees these types; provider wire formats stay inside their
//! client modules.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// No provider is configured for the requested model.
    #[error("provider {provider} is not configured")]
    ProviderUnavailable { provider: &'static str },

    /// The requested model is not in the registry.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The HTTP request to the LLM provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The LLM provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The LLM provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The provider reported an error inside an open stream.
    #[error("provider stream error ({kind}): {message}")]
    Stream { kind: String, message: String },

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for LlmError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::ProviderUnavailable { .. } => "E_PROVIDER_UNAVAILABLE",
            Self::UnknownModel(_) => "E_UNKNOWN_MODEL",
            Self::ApiRequest(_) => "E_API_REQUEST",
            Self::ApiResponse { .. } => "E_API_RESPONSE",
            Self::ApiParse(_) => "E_API_PARSE",
            Self::Stream { .. } => "E_PROVIDER_STREAM",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::ApiRequest(_) | Self::ApiResponse { status: 408 | 429 | 500..=599, .. } => true,
            Self::Stream { kind, .. } => {
                matches!(kind.as_str(), "overloaded_error" | "api_error" | "rate_limit_error" | "read")
            }
            _ => false,
        }
    }
}

// =============================================================================
// CONTENT BLOCKS
// =============================================================================

/// A structured content block in a message or API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// A plain text segment.
    #[serde(rename = "text")]
    Text { text: String },

    /// A tool invocation emitted by the model.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Provider-assigned tool call identifier.
        id: String,
        /// Name of the tool being called.
        name: String,
        /// JSON arguments for the tool.
        input: serde_json::Value,
    },

    /// The output returned from a tool call back to the model.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Matches the `id` of the originating [`ContentBlock::ToolUse`].
        tool_use_id: String,
        /// Serialized tool output.
        content: String,
        /// `true` when the tool call produced an error.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Extended thinking block. The signature must be echoed back when the
    /// block is replayed within the same tool-use turn.
    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// Any unrecognized block type; ignored by downstream logic.
    #[serde(other)]
    Unknown,
}

/// Message content: either plain text or structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// A simple string payload.
    Text(String),
    /// A sequence of typed content blocks (text, tool use, tool result, etc.).
    Blocks(Vec<ContentBlock>),
}

// =============================================================================
// TOOL DEFINITION
// =============================================================================

/// A tool definition passed to the LLM provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Content,
}

impl Message {
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: "user".into(), content: Content::Text(text.into()) }
    }
}

/// Everything a provider needs for one completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    /// Omitted when extended thinking is on; providers reject it there.
    pub temperature: Option<f32>,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub thinking_budget: Option<u32>,
}

/// Response from a one-shot chat call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ChatResponse {
    /// Concatenated text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

// =============================================================================
// STREAMING
// =============================================================================

/// One incremental event from a streaming completion.
///
/// Stop reasons are normalized to Anthropic's vocabulary: `end_turn`,
/// `tool_use`, `max_tokens`, `stop_sequence`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ReasoningDelta(String),
    ReasoningSignature(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, delta: String },
    ToolCallEnd { id: String },
    /// Token totals for the step. Emitted once, near the end.
    Usage { input_tokens: u64, output_tokens: u64 },
    Finish { stop_reason: String },
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

// =============================================================================
// LLM CHAT TRAIT
// =============================================================================

/// Provider-neutral async trait for LLM chat. Enables mocking in tests.
#[async_trait::async_trait]
pub trait LlmChat: Send + Sync {
    /// Send a one-shot chat request.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request fails, the response is malformed,
    /// or no provider serves the model.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Open a streaming completion. Dropping the stream aborts the request.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request cannot be started. Failures
    /// after the first byte arrive as `Err` items on the stream.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, LlmError>;

    /// Whether a provider is configured for `provider`.
    fn serves(&self, provider: super::registry::Provider) -> bool;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
