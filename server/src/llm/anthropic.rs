//! Anthropic Messages API client.
//!
//! Thin HTTP wrapper for `/v1/messages`, one-shot and streaming. Parsing is
//! pure (`parse_response`, `AnthropicEventParser`) for testability.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use super::config::LlmTimeouts;
use super::sse::{EventParser, check_status, event_stream};
use super::types::{ChatRequest, ChatResponse, ChatStream, ContentBlock, LlmError, Message, StreamEvent, Tool};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// Output headroom kept above the thinking budget.
const THINKING_HEADROOM_TOKENS: u32 = 1024;

// =============================================================================
// CLIENT
// =============================================================================

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    request_timeout: Duration,
}

impl AnthropicClient {
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the reqwest client cannot be built.
    pub fn new(api_key: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let request_timeout = Duration::from_secs(timeouts.request_secs);
        let http = reqwest::Client::builder()
            .read_timeout(request_timeout)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, request_timeout })
    }

    /// # Errors
    ///
    /// Returns an [`LlmError`] on transport failure, non-200 status, or an
    /// unparsable body.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = ApiRequest::from_chat(request, false);

        let response = self
            .post(&body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }

        parse_response(&text)
    }

    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request cannot be sent or the status is
    /// not a success.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, LlmError> {
        let body = ApiRequest::from_chat(request, true);
        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        let response = check_status(response).await?;
        Ok(event_stream(response, AnthropicEventParser::default()))
    }

    fn post(&self, body: &ApiRequest<'_>) -> reqwest::RequestBuilder {
        self.http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "<[Tool]>::is_empty")]
    tools: &'a [Tool],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(serde::Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

impl<'a> ApiRequest<'a> {
    fn from_chat(request: &'a ChatRequest, stream: bool) -> Self {
        let thinking = request
            .thinking_budget
            .map(|budget_tokens| ThinkingConfig { kind: "enabled", budget_tokens });
        // The API requires max_tokens > budget_tokens.
        let max_tokens = match request.thinking_budget {
            Some(budget) if request.max_tokens <= budget => budget + THINKING_HEADROOM_TOKENS,
            _ => request.max_tokens,
        };
        Self {
            model: &request.model,
            max_tokens,
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
            temperature: if thinking.is_some() { None } else { request.temperature },
            thinking,
            stream,
        }
    }
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: String,
    usage: Usage,
}

#[derive(serde::Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str) -> Result<ChatResponse, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let content: Vec<ContentBlock> = api
        .content
        .into_iter()
        .filter(|block| !matches!(block, ContentBlock::Unknown))
        .collect();

    Ok(ChatResponse {
        content,
        model: api.model,
        stop_reason: api.stop_reason,
        input_tokens: api.usage.input_tokens,
        output_tokens: api.usage.output_tokens,
    })
}

/// Streaming event parser. Content blocks are addressed by index; tool-use
/// blocks are remembered so their deltas and stop carry the call id.
#[derive(Default)]
pub(crate) struct AnthropicEventParser {
    tool_blocks: HashMap<u64, String>,
    input_tokens: u64,
}

impl EventParser for AnthropicEventParser {
    fn parse(&mut self, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
        let event: Value = serde_json::from_str(data).map_err(|e| LlmError::ApiParse(e.to_string()))?;
        let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);

        let events = match event.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                self.input_tokens = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                Vec::new()
            }
            Some("content_block_start") => {
                let block = event.get("content_block").unwrap_or(&Value::Null);
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let id = str_field(block, "id");
                    let name = str_field(block, "name");
                    self.tool_blocks.insert(index, id.clone());
                    vec![StreamEvent::ToolCallStart { id, name }]
                } else {
                    Vec::new()
                }
            }
            Some("content_block_delta") => {
                let delta = event.get("delta").unwrap_or(&Value::Null);
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => vec![StreamEvent::TextDelta(str_field(delta, "text"))],
                    Some("thinking_delta") => vec![StreamEvent::ReasoningDelta(str_field(delta, "thinking"))],
                    Some("signature_delta") => vec![StreamEvent::ReasoningSignature(str_field(delta, "signature"))],
                    Some("input_json_delta") => match self.tool_blocks.get(&index) {
                        Some(id) => vec![StreamEvent::ToolCallDelta {
                            id: id.clone(),
                            delta: str_field(delta, "partial_json"),
                        }],
                        None => Vec::new(),
                    },
                    _ => Vec::new(),
                }
            }
            Some("content_block_stop") => match self.tool_blocks.remove(&index) {
                Some(id) => vec![StreamEvent::ToolCallEnd { id }],
                None => Vec::new(),
            },
            Some("message_delta") => {
                let output_tokens = event
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let mut out = vec![StreamEvent::Usage { input_tokens: self.input_tokens, output_tokens }];
                if let Some(reason) = event.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    out.push(StreamEvent::Finish { stop_reason: reason.to_string() });
                }
                out
            }
            Some("error") => {
                let kind = event
                    .pointer("/error/type")
                    .and_then(Value::as_str)
                    .unwrap_or("error")
                    .to_string();
                let message = event
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return Err(LlmError::Stream { kind, message });
            }
            // ping, message_stop, and anything newer
            _ => Vec::new(),
        };
        Ok(events)
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
#[path = "anthropic_test.rs"]
mod tests;
