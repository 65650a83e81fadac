//! OpenAI-compatible chat-completions client.
//!
//! Serves `OpenAI` itself and any endpoint speaking the same protocol
//! (Google's Gemini compatibility layer is configured this way). Only
//! `/chat/completions` is used; streaming and one-shot share the request
//! builder.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::config::LlmTimeouts;
use super::sse::{EventParser, check_status, event_stream};
use super::types::{ChatRequest, ChatResponse, ChatStream, Content, ContentBlock, LlmError, Message, StreamEvent, Tool};

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the reqwest client cannot be built.
    pub fn new(api_key: String, base_url: &str, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let request_timeout = Duration::from_secs(timeouts.request_secs);
        let http = reqwest::Client::builder()
            .read_timeout(request_timeout)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url: base_url.trim_end_matches('/').to_string(), request_timeout })
    }

    /// # Errors
    ///
    /// Returns an [`LlmError`] on transport failure, non-200 status, or an
    /// unparsable body.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let msgs = build_chat_completions_messages(&request.system, &request.messages);
        let body = CcRequest::new(request, &msgs, false);
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
        parse_chat_completions_response(&text)
    }

    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request cannot be sent or the status is
    /// not a success.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, LlmError> {
        let msgs = build_chat_completions_messages(&request.system, &request.messages);
        let body = CcRequest::new(request, &msgs, true);
        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        let response = check_status(response).await?;
        Ok(event_stream(response, CcEventParser::default()))
    }

    fn post(&self, body: &impl Serialize) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct CcRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [CcMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<CcToolDef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

impl<'a> CcRequest<'a> {
    fn new(request: &'a ChatRequest, messages: &'a [CcMessage], stream: bool) -> Self {
        Self {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages,
            tools: request.tools.iter().map(CcToolDef::from).collect(),
            temperature: request.temperature,
            reasoning_effort: request.thinking_budget.map(reasoning_effort),
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }
}

/// Map a thinking token budget onto the coarse effort levels.
fn reasoning_effort(budget: u32) -> &'static str {
    match budget {
        0..=1024 => "low",
        1025..=8192 => "medium",
        _ => "high",
    }
}

#[derive(Serialize)]
struct CcMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<CcToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct CcToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: CcFunctionCall,
}

#[derive(Serialize)]
struct CcFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct CcToolDef<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: CcFunctionDef<'a>,
}

#[derive(Serialize)]
struct CcFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a Tool> for CcToolDef<'a> {
    fn from(tool: &'a Tool) -> Self {
        Self {
            tool_type: "function",
            function: CcFunctionDef {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

fn build_chat_completions_messages(system: &str, messages: &[Message]) -> Vec<CcMessage> {
    let mut out = Vec::new();
    if !system.trim().is_empty() {
        out.push(CcMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    for message in messages {
        match &message.content {
            Content::Text(text) => {
                out.push(CcMessage {
                    role: message.role.clone(),
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Content::Blocks(blocks) => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                let mut tool_results = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text: t } => text.push_str(t),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(CcToolCall {
                                id: id.clone(),
                                call_type: "function",
                                function: CcFunctionCall {
                                    name: name.clone(),
                                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                                },
                            });
                        }
                        ContentBlock::ToolResult { tool_use_id, content, is_error: _ } => {
                            tool_results.push(CcMessage {
                                role: "tool".to_string(),
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                        // Reasoning is not replayed to chat-completions endpoints.
                        ContentBlock::Thinking { .. } | ContentBlock::Unknown => {}
                    }
                }
                // Tool results answer the previous assistant turn, so they
                // go ahead of any text that shares their message.
                out.extend(tool_results);
                if !text.is_empty() || !tool_calls.is_empty() {
                    out.push(CcMessage {
                        role: message.role.clone(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                        tool_call_id: None,
                    });
                }
            }
        }
    }
    out
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

fn normalize_finish_reason(reason: &str, has_tool_calls: bool) -> &'static str {
    if has_tool_calls || reason == "tool_calls" {
        "tool_use"
    } else if reason == "length" {
        "max_tokens"
    } else {
        "end_turn"
    }
}

pub(crate) fn parse_chat_completions_response(json_text: &str) -> Result<ChatResponse, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();
    let prompt_tokens = root
        .pointer("/usage/prompt_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let completion_tokens = root
        .pointer("/usage/completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let Some(choice) = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    else {
        return Err(LlmError::ApiParse("chat_completions: missing choices[0]".to_string()));
    };
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .unwrap_or("stop");
    let message = choice.get("message").cloned().unwrap_or(Value::Null);

    let mut content = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        content.push(ContentBlock::Text { text: text.to_string() });
    }

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in tool_calls {
            let Some(name) = call.pointer("/function/name").and_then(Value::as_str) else {
                continue;
            };
            let Some(id) = call.get("id").and_then(Value::as_str).map(str::to_owned) else {
                return Err(LlmError::ApiParse("chat_completions: tool call missing id".to_string()));
            };
            let args = call
                .pointer("/function/arguments")
                .and_then(Value::as_str)
                .unwrap_or("{}");
            let input =
                serde_json::from_str::<Value>(args).unwrap_or_else(|_| Value::Object(serde_json::Map::default()));
            content.push(ContentBlock::ToolUse { id, name: name.to_string(), input });
        }
    }

    let has_tool_calls = content
        .iter()
        .any(|block| matches!(block, ContentBlock::ToolUse { .. }));
    let stop_reason = normalize_finish_reason(finish_reason, has_tool_calls).to_string();

    Ok(ChatResponse { content, model, stop_reason, input_tokens: prompt_tokens, output_tokens: completion_tokens })
}

/// Streaming chunk parser.
///
/// Tool calls arrive keyed by `index`; only the first fragment carries the
/// id and name. Usage arrives in a trailing chunk with empty `choices`, so
/// `Usage` and `Finish` are held until the stream ends.
#[derive(Default)]
pub(crate) struct CcEventParser {
    calls: BTreeMap<u64, String>,
    finish_reason: Option<String>,
    saw_tool_calls: bool,
    usage: Option<(u64, u64)>,
}

impl CcEventParser {
    fn close_calls(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.calls)
            .into_values()
            .map(|id| StreamEvent::ToolCallEnd { id })
            .collect()
    }
}

impl EventParser for CcEventParser {
    fn parse(&mut self, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
        let chunk: Value = serde_json::from_str(data).map_err(|e| LlmError::ApiParse(e.to_string()))?;

        if let Some(error) = chunk.get("error") {
            let kind = error
                .get("type")
                .or_else(|| error.get("code"))
                .and_then(Value::as_str)
                .unwrap_or("api_error")
                .to_string();
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(LlmError::Stream { kind, message });
        }

        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            let input = usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
            let output = usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
            self.usage = Some((input, output));
        }

        let mut events = Vec::new();
        let Some(choice) = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            return Ok(events);
        };
        let delta = choice.get("delta").unwrap_or(&Value::Null);

        if let Some(reasoning) = delta.get("reasoning_content").and_then(Value::as_str)
            && !reasoning.is_empty()
        {
            events.push(StreamEvent::ReasoningDelta(reasoning.to_string()));
        }
        if let Some(text) = delta.get("content").and_then(Value::as_str)
            && !text.is_empty()
        {
            events.push(StreamEvent::TextDelta(text.to_string()));
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                if !self.calls.contains_key(&index) {
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .map_or_else(|| format!("call_{index}"), str::to_owned);
                    let name = call
                        .pointer("/function/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    self.calls.insert(index, id.clone());
                    self.saw_tool_calls = true;
                    events.push(StreamEvent::ToolCallStart { id, name });
                }
                if let Some(args) = call.pointer("/function/arguments").and_then(Value::as_str)
                    && !args.is_empty()
                    && let Some(id) = self.calls.get(&index)
                {
                    events.push(StreamEvent::ToolCallDelta { id: id.clone(), delta: args.to_string() });
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(reason.to_string());
            events.extend(self.close_calls());
        }
        Ok(events)
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = self.close_calls();
        if let Some((input_tokens, output_tokens)) = self.usage.take() {
            events.push(StreamEvent::Usage { input_tokens, output_tokens });
        }
        if let Some(reason) = self.finish_reason.take() {
            let stop_reason = normalize_finish_reason(&reason, self.saw_tool_calls).to_string();
            events.push(StreamEvent::Finish { stop_reason });
        }
        events
    }
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;
