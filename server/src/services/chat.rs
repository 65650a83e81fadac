//! Chat service: one user message in, one streamed assistant message out.
//!
//! DESIGN
//! ======
//! `start_turn` does everything that can fail with an HTTP status before it
//! returns: validation, ownership, model resolution and the durable write
//! of the user message. The rest runs in a spawned task that writes
//! `StreamPart`s into a bounded channel; the route wraps the receiver as
//! the SSE body, so the channel bound is the backpressure.
//!
//! The task folds every part it emits through a `MessageAssembler` and
//! persists that fold, so the stored assistant message is exactly what the
//! client rendered. Provider events are consumed in a single
//! `while let Some(event)` loop per step; a step that ends with tool calls
//! runs the tools, appends their results and starts the next step.
//!
//! The conversation's turn lock is held from before history is loaded until
//! the assistant message and usage row are written. A failed send means the
//! client went away: the provider stream is dropped, and what was assembled
//! so far is still persisted with `success = false`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use lume_protocol::message::server_message_id;
use lume_protocol::{
    ChatTurnRequest, ConversationSettings, MessageAssembler, PartialJson, Role, StreamPart, UiMessage,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::history::to_provider_history;
use super::locks::TurnGuard;
use super::search::WebSearch;
use super::store::{ChatStore, ConversationUpdate, StoreError, UsageRecord};
use super::title::generate_title;
use super::tools::{self, ToolContext};
use crate::config::ChatConfig;
use crate::error::ErrorCode;
use crate::llm::LlmChat;
use crate::llm::registry::{self, ModelInfo};
use crate::llm::tools::tool_definitions;
use crate::llm::types::{ChatRequest, Content, ContentBlock, LlmError, Message, StreamEvent};
use crate::state::AppState;

/// Data part name for a freshly generated conversation title.
pub const TITLE_DATA_NAME: &str = "title";

const SYSTEM_PROMPT: &str = "You are Lume, a helpful assistant. Answer clearly and use Markdown where it helps.\n\
     When the user asks for a presentation, slide deck or outline, call the generateOutline tool with the full \
     outline instead of writing it as text, then summarize it briefly.\n\
     When web tools are available, use webSearch for current or factual questions and webExtract to read \
     specific pages, and cite the sources you used.";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conversation not found: {0}")]
    NotFound(Uuid),
    #[error("model {model} is not available: {provider} is not configured")]
    ModelUnavailable { model: String, provider: &'static str },
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("turn exceeded {0:?}")]
    Timeout(Duration),
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "E_INVALID_INPUT",
            Self::NotFound(_) => "E_CONVERSATION_NOT_FOUND",
            Self::ModelUnavailable { .. } => "E_MODEL_UNAVAILABLE",
            Self::Persistence(_) => "E_PERSISTENCE",
            Self::Llm(e) => e.error_code(),
            Self::Timeout(_) => "E_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Persistence(e) => e.retryable(),
            Self::Llm(e) => e.retryable(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

fn lookup_error(err: StoreError) -> ChatError {
    match err {
        StoreError::ConversationNotFound(id) => ChatError::NotFound(id),
        other => ChatError::Persistence(other),
    }
}

// =============================================================================
// SETUP
// =============================================================================

/// Validate and persist the user message, then spawn the turn.
///
/// # Errors
///
/// `InvalidInput` for a malformed message or unknown model, `NotFound` when
/// the conversation does not exist for `caller`, `ModelUnavailable` when no
/// provider serves the model, `Persistence` when the user message cannot be
/// written.
pub async fn start_turn(
    state: &AppState,
    caller: Option<Uuid>,
    request: ChatTurnRequest,
) -> Result<ReceiverStream<StreamPart>, ChatError> {
    let ChatTurnRequest { conversation_id, message, model_id } = request;
    validate_message(&message)?;

    let conversation = state
        .store
        .get_conversation(conversation_id, caller)
        .await
        .map_err(lookup_error)?;
    let guard = state.locks.acquire(conversation_id).await;

    let requested = model_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    let model_id = requested
        .or(conversation.model_id.as_deref())
        .unwrap_or(state.config.chat.default_model.as_str());
    let model =
        registry::find(model_id).ok_or_else(|| ChatError::InvalidInput(format!("unknown model: {model_id}")))?;
    let llm = match &state.llm {
        Some(llm) if llm.serves(model.provider) => Arc::clone(llm),
        _ => {
            return Err(ChatError::ModelUnavailable {
                model: model.id.to_string(),
                provider: model.provider.as_str(),
            });
        }
    };
    if let Some(requested) = requested
        && conversation.model_id.as_deref() != Some(requested)
    {
        state
            .store
            .update_conversation(conversation_id, caller, ConversationUpdate::model(requested))
            .await
            .map_err(lookup_error)?;
    }

    let mut history = state.store.load_messages(conversation_id).await?;
    let first_message = history.is_empty();
    let inserted = state.store.append_message(conversation_id, &message).await?;
    state.store.touch_conversation(conversation_id, true).await?;
    info!(%conversation_id, model = model.id, first_message, inserted, "chat: user message persisted");

    let (tx, rx) = mpsc::channel(state.config.chat.stream_buffer.max(1));
    let title = if first_message {
        spawn_title(state, &llm, model, conversation_id, caller, message.text(), tx.clone())
    } else {
        None
    };

    match history.iter().position(|m| m.id == message.id) {
        // A retried turn supersedes whatever was stored after the original.
        Some(pos) if !inserted => {
            history.truncate(pos + 1);
            let dropped = state.store.delete_messages_after(conversation_id, &message.id).await?;
            info!(%conversation_id, message_id = %message.id, dropped, "chat: retried turn");
        }
        _ => history.push(message),
    }
    let replay = to_provider_history(&history);
    let system = replay.system_prompt(SYSTEM_PROMPT);
    let turn = Turn {
        store: Arc::clone(&state.store),
        llm,
        search: state.search.clone(),
        config: state.config.chat.clone(),
        model,
        conversation_id,
        settings: conversation.settings,
        tx,
        assembler: MessageAssembler::new(server_message_id()),
        blocks: 0,
        cancelled: false,
        input_tokens: 0,
        output_tokens: 0,
    };
    tokio::spawn(turn.run(replay.messages, system, title, guard));

    Ok(ReceiverStream::new(rx))
}

fn validate_message(message: &UiMessage) -> Result<(), ChatError> {
    if message.role != Role::User {
        return Err(ChatError::InvalidInput(format!("message role must be user, got {}", message.role.as_str())));
    }
    if message.id.trim().is_empty() {
        return Err(ChatError::InvalidInput("message id is required".into()));
    }
    if message.parts.is_empty() {
        return Err(ChatError::InvalidInput("message has no parts".into()));
    }
    Ok(())
}

/// Best-effort title for a brand-new conversation. Uses the fast title
/// model when its provider is configured, otherwise the turn's model.
fn spawn_title(
    state: &AppState,
    llm: &Arc<dyn LlmChat>,
    chat_model: &'static ModelInfo,
    conversation_id: Uuid,
    owner: Option<Uuid>,
    first_message: String,
    tx: mpsc::Sender<StreamPart>,
) -> Option<JoinHandle<()>> {
    if first_message.trim().is_empty() {
        return None;
    }
    let model = registry::find(&state.config.chat.title_model)
        .filter(|m| llm.serves(m.provider))
        .unwrap_or(chat_model);
    let timeout = state.config.chat.title_timeout;
    let store = Arc::clone(&state.store);
    let llm = Arc::clone(llm);

    Some(tokio::spawn(async move {
        let title = match generate_title(llm.as_ref(), model.id, &first_message, timeout).await {
            Ok(title) => title,
            Err(e) => {
                warn!(%conversation_id, model = model.id, error = %e, "chat: title generation skipped");
                return;
            }
        };
        if let Err(e) = store
            .update_conversation(conversation_id, owner, ConversationUpdate::title(title.clone()))
            .await
        {
            warn!(%conversation_id, error = %e, "chat: title not saved");
            return;
        }
        info!(%conversation_id, %title, "chat: title generated");
        let part = StreamPart::Data {
            name: TITLE_DATA_NAME.into(),
            id: None,
            data: json!({ "title": title }),
            transient: true,
        };
        // The client may already be gone; the title is saved either way.
        let _ = tx.send(part).await;
    }))
}

// =============================================================================
// TURN TASK
// =============================================================================

struct Turn {
    store: Arc<dyn ChatStore>,
    llm: Arc<dyn LlmChat>,
    search: Option<Arc<dyn WebSearch>>,
    config: ChatConfig,
    model: &'static ModelInfo,
    conversation_id: Uuid,
    settings: ConversationSettings,
    tx: mpsc::Sender<StreamPart>,
    assembler: MessageAssembler,
    /// Counter for text / reasoning part ids.
    blocks: usize,
    cancelled: bool,
    input_tokens: u64,
    output_tokens: u64,
}

/// A tool call whose input is still streaming.
struct PendingCall {
    id: String,
    name: String,
    input: PartialJson,
    last_view: Option<Value>,
}

/// A tool call whose input is complete.
struct ReadyCall {
    id: String,
    name: String,
    input: Value,
    invalid: Option<String>,
}

/// What one provider step produced, for the next request.
#[derive(Default)]
struct StepOutput {
    thinking: String,
    signature: Option<String>,
    text: String,
    calls: Vec<ReadyCall>,
    stop_reason: Option<String>,
}

impl StepOutput {
    fn assistant_blocks(&self) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        if let Some(signature) = &self.signature {
            blocks.push(ContentBlock::Thinking {
                thinking: self.thinking.clone(),
                signature: Some(signature.clone()),
            });
        }
        if !self.text.is_empty() {
            blocks.push(ContentBlock::Text { text: self.text.clone() });
        }
        blocks.extend(self.calls.iter().map(|call| ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        }));
        blocks
    }
}

/// Which text-like part is currently open.
enum Open {
    None,
    Text(String),
    Reasoning(String),
}

/// Provider stop reason → stream finish reason.
fn finish_reason(stop_reason: &str) -> &'static str {
    match stop_reason {
        "max_tokens" => "length",
        "tool_use" => "tool-calls",
        "end_turn" | "stop_sequence" => "stop",
        _ => "other",
    }
}

impl Turn {
    async fn run(
        mut self,
        mut messages: Vec<Message>,
        system: String,
        title: Option<JoinHandle<()>>,
        guard: TurnGuard,
    ) {
        let started = Instant::now();
        let message_id = self.assembler.id().to_string();
        info!(conversation_id = %self.conversation_id, %message_id, model = self.model.id, "chat: turn started");
        self.emit(StreamPart::Start { message_id }).await;

        let deadline = tokio::time::Instant::now() + self.config.max_duration;
        let outcome = match tokio::time::timeout_at(deadline, self.steps(&mut messages, &system)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ChatError::Timeout(self.config.max_duration)),
        };

        let (reason, success) = match outcome {
            Ok(_) if self.cancelled => ("abort".to_string(), false),
            Ok(reason) => (reason.to_string(), true),
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, error = %e, "chat: turn failed");
                self.emit(StreamPart::error(e.error_code(), e.to_string(), e.retryable())).await;
                ("error".to_string(), false)
            }
        };

        if let Some(title) = title
            && let Err(e) = title.await
        {
            warn!(conversation_id = %self.conversation_id, error = %e, "chat: title task failed");
        }
        self.emit(StreamPart::Finish { finish_reason: Some(reason) }).await;
        self.persist(started, success).await;
        drop(guard);
    }

    /// Send a part to the client and fold it into the assistant message.
    async fn emit(&mut self, part: StreamPart) {
        self.assembler.apply(&part);
        if self.cancelled {
            return;
        }
        if self.tx.send(part).await.is_err() {
            info!(conversation_id = %self.conversation_id, "chat: client disconnected");
            self.cancelled = true;
        }
    }

    async fn steps(&mut self, messages: &mut Vec<Message>, system: &str) -> Result<&'static str, ChatError> {
        let tools = tool_definitions(self.settings.websearch && self.search.is_some());
        let thinking = (self.settings.extended_thinking && self.model.reasoning).then_some(self.config.thinking_budget);
        let mut reason = "stop";

        for step in 0..self.config.max_steps.max(1) {
            let request = ChatRequest {
                model: self.model.id.to_string(),
                max_tokens: self.config.max_tokens,
                temperature: thinking.is_none().then_some(self.config.temperature),
                system: system.to_string(),
                messages: messages.clone(),
                tools: tools.clone(),
                thinking_budget: thinking,
            };

            self.emit(StreamPart::StartStep).await;
            let output = self.step(&request).await?;
            if self.cancelled {
                return Ok("abort");
            }
            reason = output.stop_reason.as_deref().map_or("stop", finish_reason);
            info!(
                conversation_id = %self.conversation_id,
                step,
                stop_reason = output.stop_reason.as_deref().unwrap_or("none"),
                tool_calls = output.calls.len(),
                "chat: step complete"
            );

            let blocks = output.assistant_blocks();
            if !blocks.is_empty() {
                messages.push(Message { role: "assistant".into(), content: Content::Blocks(blocks) });
            }
            if output.calls.is_empty() {
                self.emit(StreamPart::FinishStep).await;
                return Ok(reason);
            }

            let results = self.run_tools(&output.calls).await;
            messages.push(Message { role: "user".into(), content: Content::Blocks(results) });
            self.emit(StreamPart::FinishStep).await;
            reason = "tool-calls";
        }
        Ok(reason)
    }

    /// Consume one provider stream, relaying its events.
    async fn step(&mut self, request: &ChatRequest) -> Result<StepOutput, ChatError> {
        let mut stream = self.llm.chat_stream(request).await?;
        let mut output = StepOutput::default();
        let mut open = Open::None;
        let mut pending: Vec<PendingCall> = Vec::new();

        while let Some(event) = stream.next().await {
            if self.cancelled {
                break;
            }
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    self.close(&mut open).await;
                    return Err(e.into());
                }
            };
            match event {
                StreamEvent::TextDelta(delta) => {
                    let id = self.open_text(&mut open).await;
                    output.text.push_str(&delta);
                    self.emit(StreamPart::TextDelta { id, delta }).await;
                }
                StreamEvent::ReasoningDelta(delta) => {
                    let id = self.open_reasoning(&mut open).await;
                    output.thinking.push_str(&delta);
                    self.emit(StreamPart::ReasoningDelta { id, delta }).await;
                }
                StreamEvent::ReasoningSignature(signature) => {
                    output.signature.get_or_insert_with(String::new).push_str(&signature);
                }
                StreamEvent::ToolCallStart { id, name } => {
                    self.close(&mut open).await;
                    self.emit(StreamPart::ToolInputStart { tool_call_id: id.clone(), tool_name: name.clone() }).await;
                    pending.push(PendingCall { id, name, input: PartialJson::new(), last_view: None });
                }
                StreamEvent::ToolCallDelta { id, delta } => {
                    let Some(call) = pending.iter_mut().find(|call| call.id == id) else {
                        continue;
                    };
                    let view = call
                        .input
                        .push(&delta)
                        .map(|value| tools::partial_view(&call.name, value))
                        .filter(|view| call.last_view.as_ref() != Some(view));
                    if let Some(view) = &view {
                        call.last_view = Some(view.clone());
                    }
                    self.emit(StreamPart::ToolInputDelta { tool_call_id: id.clone(), input_text_delta: delta })
                        .await;
                    if let Some(input) = view {
                        self.emit(StreamPart::ToolInputPartial { tool_call_id: id, input }).await;
                    }
                }
                StreamEvent::ToolCallEnd { id } => {
                    if let Some(index) = pending.iter().position(|call| call.id == id) {
                        let ready = self.complete_call(pending.remove(index)).await;
                        output.calls.push(ready);
                    }
                }
                StreamEvent::Usage { input_tokens, output_tokens } => {
                    self.input_tokens += input_tokens;
                    self.output_tokens += output_tokens;
                }
                StreamEvent::Finish { stop_reason } => output.stop_reason = Some(stop_reason),
            }
        }
        drop(stream);

        self.close(&mut open).await;
        if !self.cancelled {
            for call in pending {
                let ready = self.complete_call(call).await;
                output.calls.push(ready);
            }
        }
        Ok(output)
    }

    async fn open_text(&mut self, open: &mut Open) -> String {
        if let Open::Text(id) = open {
            return id.clone();
        }
        self.close(open).await;
        let id = self.next_block_id("text");
        self.emit(StreamPart::TextStart { id: id.clone() }).await;
        *open = Open::Text(id.clone());
        id
    }

    async fn open_reasoning(&mut self, open: &mut Open) -> String {
        if let Open::Reasoning(id) = open {
            return id.clone();
        }
        self.close(open).await;
        let id = self.next_block_id("reasoning");
        self.emit(StreamPart::ReasoningStart { id: id.clone() }).await;
        *open = Open::Reasoning(id.clone());
        id
    }

    async fn close(&mut self, open: &mut Open) {
        match std::mem::replace(open, Open::None) {
            Open::None => {}
            Open::Text(id) => self.emit(StreamPart::TextEnd { id }).await,
            Open::Reasoning(id) => self.emit(StreamPart::ReasoningEnd { id }).await,
        }
    }

    fn next_block_id(&mut self, kind: &str) -> String {
        self.blocks += 1;
        format!("{kind}-{}", self.blocks)
    }

    async fn complete_call(&mut self, call: PendingCall) -> ReadyCall {
        let (input, invalid) = match call.input.finish() {
            Ok(input) => (input, None),
            Err(e) => (json!({}), Some(format!("tool input is not valid JSON: {e}"))),
        };
        self.emit(StreamPart::ToolInputAvailable {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            input: input.clone(),
        })
        .await;
        ReadyCall { id: call.id, name: call.name, input, invalid }
    }

    /// Execute every call of a step in order; returns the tool results.
    async fn run_tools(&mut self, calls: &[ReadyCall]) -> Vec<ContentBlock> {
        let store = Arc::clone(&self.store);
        let search = self.search.clone();
        let message_id = self.assembler.id().to_string();
        let ctx = ToolContext {
            store: store.as_ref(),
            search: search.as_deref(),
            conversation_id: self.conversation_id,
            message_id: &message_id,
        };

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = match &call.invalid {
                Some(message) => Err(message.clone()),
                None => tools::execute(&ctx, &call.id, &call.name, &call.input)
                    .await
                    .map_err(|e| {
                        warn!(tool = %call.name, code = e.error_code(), error = %e, "chat: tool error");
                        e.to_string()
                    }),
            };
            match outcome {
                Ok(outcome) => {
                    info!(tool = %call.name, tool_call_id = %call.id, "chat: tool ok");
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: call.id.clone(),
                        content: outcome.output.to_string(),
                        is_error: None,
                    });
                    let tool_call_id = call.id.clone();
                    self.emit(StreamPart::ToolOutputAvailable { tool_call_id, output: outcome.output }).await;
                    for part in outcome.parts {
                        self.emit(part).await;
                    }
                }
                Err(error_text) => {
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: call.id.clone(),
                        content: error_text.clone(),
                        is_error: Some(true),
                    });
                    self.emit(StreamPart::ToolOutputError { tool_call_id: call.id.clone(), error_text }).await;
                }
            }
        }
        results
    }

    /// Write the assistant message and the usage row. Failures are logged.
    async fn persist(&self, started: Instant, success: bool) {
        let conversation_id = self.conversation_id;
        if self.assembler.has_content() {
            let message = self.assembler.message();
            if let Err(e) = self.store.append_message(conversation_id, &message).await {
                error!(%conversation_id, message_id = %message.id, error = %e, "chat: assistant message not persisted");
            }
        }
        if let Err(e) = self.store.touch_conversation(conversation_id, true).await {
            error!(%conversation_id, error = %e, "chat: conversation touch failed");
        }

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let usage = UsageRecord {
            conversation_id,
            model_id: self.model.id.to_string(),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cost_usd: registry::estimate_cost(self.model, self.input_tokens, self.output_tokens),
            latency_ms,
            success,
        };
        if let Err(e) = self.store.record_usage(usage).await {
            error!(%conversation_id, error = %e, "chat: usage not recorded");
        }
        info!(
            %conversation_id,
            success,
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            latency_ms,
            parts = self.assembler.parts().len(),
            "chat: turn complete"
        );
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
