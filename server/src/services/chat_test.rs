use std::collections::HashMap;

use lume_protocol::{ConversationSettings, MessagePart, SlidesOutline, ToolState};

use super::*;
use crate::llm::registry::Provider;
use crate::services::memory_store::MemoryChatStore;
use crate::state::test_helpers::{self, MockLlm, ScriptedStream, text_turn};

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    state: AppState,
    store: Arc<MemoryChatStore>,
    llm: Arc<MockLlm>,
}

fn harness(llm: MockLlm) -> Harness {
    let store = Arc::new(MemoryChatStore::new());
    let llm = Arc::new(llm);
    let state = test_helpers::test_app_state_with_store(store.clone(), llm.clone());
    Harness { state, store, llm }
}

fn turn(conversation_id: Uuid, text: &str) -> ChatTurnRequest {
    ChatTurnRequest { conversation_id, message: UiMessage::user_text(text), model_id: None }
}

/// Run a turn to completion and return every part the client received.
async fn run_turn(state: &AppState, request: ChatTurnRequest) -> Vec<StreamPart> {
    start_turn(state, None, request)
        .await
        .expect("turn should start")
        .collect()
        .await
}

fn without_title(parts: &[StreamPart]) -> Vec<StreamPart> {
    parts
        .iter()
        .filter(|p| !matches!(p, StreamPart::Data { transient: true, .. }))
        .cloned()
        .collect()
}

fn tool_states(message: &UiMessage) -> HashMap<String, ToolState> {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Tool { tool_call_id, state, .. } => Some((tool_call_id.clone(), *state)),
            _ => None,
        })
        .collect()
}

fn outline_tool_call(id: &str) -> ScriptedStream {
    let input = json!({
        "outline": { "pptTitle": "Rust", "slidesCount": 2, "overallRequirements": "" },
        "chapters": [{ "chapterTitle": "Basics", "slides": [
            { "slideNumber": 1, "slideTitle": "Ownership", "slideContent": "moves", "slideType": "content" },
            { "slideNumber": 2, "slideTitle": "Borrowing", "slideContent": "refs", "slideType": "content" }
        ] }]
    })
    .to_string();
    let (head, tail) = input.split_at(input.len() / 2);
    vec![
        Ok(StreamEvent::TextDelta("Drafting.".into())),
        Ok(StreamEvent::ToolCallStart { id: id.into(), name: "generateOutline".into() }),
        Ok(StreamEvent::ToolCallDelta { id: id.into(), delta: head.into() }),
        Ok(StreamEvent::ToolCallDelta { id: id.into(), delta: tail.into() }),
        Ok(StreamEvent::ToolCallEnd { id: id.into() }),
        Ok(StreamEvent::Usage { input_tokens: 10, output_tokens: 5 }),
        Ok(StreamEvent::Finish { stop_reason: "tool_use".into() }),
    ]
}

// =========================================================================
// Setup errors
// =========================================================================

#[tokio::test]
async fn rejects_non_user_messages_and_empty_parts() {
    let h = harness(MockLlm::new(vec![]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let mut request = turn(id, "hi");
    request.message.role = Role::Assistant;
    assert!(matches!(start_turn(&h.state, None, request).await, Err(ChatError::InvalidInput(_))));

    let mut request = turn(id, "hi");
    request.message.parts.clear();
    assert!(matches!(start_turn(&h.state, None, request).await, Err(ChatError::InvalidInput(_))));
    assert!(h.store.load_messages(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_or_foreign_conversation_is_not_found() {
    let h = harness(MockLlm::new(vec![]));
    let owner = Uuid::new_v4();
    let id = test_helpers::seed_conversation(&h.state, Some(owner)).await;

    let err = start_turn(&h.state, None, turn(Uuid::new_v4(), "hi")).await.unwrap_err();
    assert_eq!(err.error_code(), "E_CONVERSATION_NOT_FOUND");
    let err = start_turn(&h.state, Some(Uuid::new_v4()), turn(id, "hi")).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(found) if found == id));
}

#[tokio::test]
async fn unknown_model_is_invalid_and_unserved_provider_is_unavailable() {
    let h = harness(MockLlm::new(vec![]).without_provider(Provider::OpenAi));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let mut request = turn(id, "hi");
    request.model_id = Some("gpt-9".into());
    assert!(matches!(start_turn(&h.state, None, request).await, Err(ChatError::InvalidInput(_))));

    let mut request = turn(id, "hi");
    request.model_id = Some("gpt-4o".into());
    let err = start_turn(&h.state, None, request).await.unwrap_err();
    assert!(matches!(err, ChatError::ModelUnavailable { provider: "openai", .. }));
    assert!(h.store.load_messages(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn no_llm_configured_is_unavailable() {
    let state = test_helpers::test_app_state();
    let id = test_helpers::seed_conversation(&state, None).await;
    let err = start_turn(&state, None, turn(id, "hi")).await.unwrap_err();
    assert_eq!(err.error_code(), "E_MODEL_UNAVAILABLE");
    assert_eq!(state.locks.active(), 0);
}

// =========================================================================
// Happy path
// =========================================================================

#[tokio::test]
async fn first_turn_persists_messages_title_and_usage() {
    let h = harness(MockLlm::new(vec![text_turn("Hello there")]));
    let id = test_helpers::seed_conversation(&h.state, None).await;
    let request = turn(id, "Hi");
    let sent = request.message.clone();

    let parts = run_turn(&h.state, request).await;

    let messages = h.store.load_messages(id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], sent);
    assert_eq!(messages[1].role, Role::Assistant);
    assert!(messages[1].id.starts_with("msg-"));
    assert_eq!(messages[1].text(), "Hello there");

    assert!(parts.iter().any(|p| matches!(
        p,
        StreamPart::Data { name, transient: true, data, .. } if name == TITLE_DATA_NAME && data["title"] == "Mock Title"
    )));
    let conversation = h.store.get_conversation(id, None).await.unwrap();
    assert_eq!(conversation.title, "Mock Title");
    assert!(conversation.last_message_at.is_some());

    let usage = h.store.usage().await;
    assert_eq!(usage.len(), 1);
    assert!(usage[0].success);
    assert_eq!((usage[0].input_tokens, usage[0].output_tokens), (10, 5));
    assert_eq!(usage[0].model_id, h.state.config.chat.default_model);
    assert!(usage[0].cost_usd > 0.0);
    assert_eq!(h.state.locks.active(), 0);
}

#[tokio::test]
async fn relays_parts_in_order() {
    let h = harness(MockLlm::new(vec![text_turn("Hello")]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let parts = without_title(&run_turn(&h.state, turn(id, "Hi")).await);
    let StreamPart::Start { message_id } = &parts[0] else { panic!("first part must be start") };
    assert_eq!(
        &parts[1..],
        [
            StreamPart::StartStep,
            StreamPart::TextStart { id: "text-1".into() },
            StreamPart::TextDelta { id: "text-1".into(), delta: "Hello".into() },
            StreamPart::TextEnd { id: "text-1".into() },
            StreamPart::FinishStep,
            StreamPart::Finish { finish_reason: Some("stop".into()) },
        ]
    );
    let stored = h.store.load_messages(id).await.unwrap();
    assert_eq!(&stored[1].id, message_id);
}

#[tokio::test]
async fn persisted_message_is_the_fold_of_streamed_parts() {
    let h = harness(MockLlm::new(vec![
        vec![
            Ok(StreamEvent::ReasoningDelta("Think".into())),
            Ok(StreamEvent::ReasoningDelta("ing".into())),
            Ok(StreamEvent::ReasoningSignature("sig".into())),
            Ok(StreamEvent::TextDelta("A".into())),
            Ok(StreamEvent::TextDelta("B".into())),
            Ok(StreamEvent::Finish { stop_reason: "max_tokens".into() }),
        ],
    ]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let parts = run_turn(&h.state, turn(id, "Hi")).await;
    let mut client = MessageAssembler::new("");
    for part in &parts {
        client.apply(part);
    }

    let stored = h.store.load_messages(id).await.unwrap();
    assert_eq!(stored[1], client.message());
    assert_eq!(
        stored[1].parts,
        vec![
            MessagePart::StepStart,
            MessagePart::Reasoning { text: "Thinking".into() },
            MessagePart::text("AB"),
        ]
    );
    assert_eq!(client.finish_reason(), Some("length"));
}

#[tokio::test]
async fn later_turns_replay_history_and_skip_title() {
    let h = harness(MockLlm::new(vec![text_turn("one"), text_turn("two")]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    run_turn(&h.state, turn(id, "first")).await;
    let parts = run_turn(&h.state, turn(id, "second")).await;

    assert!(!parts.iter().any(|p| matches!(p, StreamPart::Data { .. })));
    assert_eq!(h.llm.chat_requests.lock().unwrap().len(), 1);

    let requests = h.llm.stream_requests.lock().unwrap();
    let replayed: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(replayed, ["user", "assistant", "user"]);
    assert!(requests[1].system.starts_with("You are Lume"));
    assert_eq!(h.store.load_messages(id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn model_override_is_stored() {
    let h = harness(MockLlm::new(vec![]));
    let id = test_helpers::seed_conversation(&h.state, None).await;
    let mut request = turn(id, "hi");
    request.model_id = Some("gpt-4o-mini".into());

    run_turn(&h.state, request).await;

    let conversation = h.store.get_conversation(id, None).await.unwrap();
    assert_eq!(conversation.model_id.as_deref(), Some("gpt-4o-mini"));
    let requests = h.llm.stream_requests.lock().unwrap();
    assert_eq!(requests[0].model, "gpt-4o-mini");
}

#[tokio::test]
async fn title_falls_back_to_chat_model_when_title_provider_is_missing() {
    let h = harness(MockLlm::new(vec![]).without_provider(Provider::Anthropic));
    let id = test_helpers::seed_conversation(&h.state, None).await;
    let mut request = turn(id, "hi");
    request.model_id = Some("gpt-4o".into());

    run_turn(&h.state, request).await;

    let titles = h.llm.chat_requests.lock().unwrap();
    assert_eq!(titles[0].model, "gpt-4o");
}

#[tokio::test]
async fn failed_title_is_skipped() {
    let llm = MockLlm::new(vec![]).with_responses(vec![Err(LlmError::ApiRequest("down".into()))]);
    let h = harness(llm);
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let parts = run_turn(&h.state, turn(id, "hi")).await;

    assert!(!parts.iter().any(|p| matches!(p, StreamPart::Data { .. })));
    assert_eq!(h.store.get_conversation(id, None).await.unwrap().title, "New Chat");
    assert_eq!(h.store.load_messages(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn extended_thinking_drops_temperature_on_reasoning_models() {
    let h = harness(MockLlm::new(vec![]));
    let settings = ConversationSettings { websearch: true, extended_thinking: true };
    let id = test_helpers::seed_conversation_with(&h.state, None, settings).await;

    run_turn(&h.state, turn(id, "hi")).await;

    let requests = h.llm.stream_requests.lock().unwrap();
    assert_eq!(requests[0].thinking_budget, Some(h.state.config.chat.thinking_budget));
    assert_eq!(requests[0].temperature, None);
    // No search backend: web tools stay off even with websearch enabled.
    let tools: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tools, ["generateOutline"]);
}

// =========================================================================
// Tools
// =========================================================================

#[tokio::test]
async fn tool_calls_run_and_feed_the_next_step() {
    let h = harness(MockLlm::new(vec![outline_tool_call("call_1"), text_turn("Here it is.")]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let parts = run_turn(&h.state, turn(id, "make slides")).await;

    assert!(parts.iter().any(|p| matches!(p, StreamPart::ToolInputPartial { .. })));
    assert!(parts.iter().any(|p| matches!(p, StreamPart::ToolOutputAvailable { .. })));
    assert_eq!(parts.iter().filter(|p| matches!(p, StreamPart::StartStep)).count(), 2);

    let stored = h.store.load_messages(id).await.unwrap();
    let assistant = &stored[1];
    assert_eq!(tool_states(assistant)["call_1"], ToolState::OutputAvailable);
    assert!(assistant.parts.iter().any(|p| matches!(p, MessagePart::Data { name, .. } if name == "artifact")));
    assert!(assistant.text().ends_with("Here it is."));

    let artifacts = h.store.artifacts().await;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].message_id.as_deref(), Some(assistant.id.as_str()));
    let outline: SlidesOutline = serde_json::from_value(artifacts[0].content.clone()).unwrap();
    assert!(outline.is_consistent());

    let requests = h.llm.stream_requests.lock().unwrap();
    let second = &requests[1].messages;
    assert_eq!(second.len(), 3);
    let Content::Blocks(results) = &second[2].content else { panic!("expected tool results") };
    assert!(matches!(&results[0], ContentBlock::ToolResult { tool_use_id, is_error: None, .. } if tool_use_id == "call_1"));

    let usage = h.store.usage().await;
    assert_eq!((usage[0].input_tokens, usage[0].output_tokens), (20, 10));
}

#[tokio::test]
async fn bad_tool_calls_become_tool_errors() {
    let h = harness(MockLlm::new(vec![
        vec![
            Ok(StreamEvent::ToolCallStart { id: "call_a".into(), name: "launchRocket".into() }),
            Ok(StreamEvent::ToolCallEnd { id: "call_a".into() }),
            Ok(StreamEvent::ToolCallStart { id: "call_b".into(), name: "generateOutline".into() }),
            Ok(StreamEvent::ToolCallDelta { id: "call_b".into(), delta: "{\"outline\": ".into() }),
            Ok(StreamEvent::ToolCallEnd { id: "call_b".into() }),
            Ok(StreamEvent::Finish { stop_reason: "tool_use".into() }),
        ],
        text_turn("Sorry."),
    ]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let parts = run_turn(&h.state, turn(id, "go")).await;

    let errors: Vec<&str> = parts
        .iter()
        .filter_map(|p| match p {
            StreamPart::ToolOutputError { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(errors, ["call_a", "call_b"]);
    let stored = h.store.load_messages(id).await.unwrap();
    let states = tool_states(&stored[1]);
    assert_eq!(states["call_a"], ToolState::OutputError);
    assert_eq!(states["call_b"], ToolState::OutputError);
    assert!(h.store.artifacts().await.is_empty());
    assert!(parts.contains(&StreamPart::Finish { finish_reason: Some("stop".into()) }));
}

#[tokio::test]
async fn step_limit_ends_a_tool_loop() {
    let script: Vec<ScriptedStream> = (0..10).map(|i| outline_tool_call(&format!("call_{i}"))).collect();
    let h = harness(MockLlm::new(script));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let parts = run_turn(&h.state, turn(id, "loop")).await;

    let max_steps = h.state.config.chat.max_steps;
    assert_eq!(h.llm.stream_requests.lock().unwrap().len(), max_steps);
    assert_eq!(parts.last(), Some(&StreamPart::Finish { finish_reason: Some("tool-calls".into()) }));
    assert_eq!(h.store.artifacts().await.len(), max_steps);
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn provider_error_mid_stream_keeps_partial_output() {
    let h = harness(MockLlm::new(vec![vec![
        Ok(StreamEvent::TextDelta("Partial".into())),
        Err(LlmError::Stream { kind: "overloaded_error".into(), message: "Overloaded".into() }),
    ]]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let parts = without_title(&run_turn(&h.state, turn(id, "hi")).await);

    let n = parts.len();
    assert!(matches!(
        &parts[n - 2],
        StreamPart::Error { code, retryable: true, .. } if code == "E_PROVIDER_STREAM"
    ));
    assert_eq!(parts[n - 1], StreamPart::Finish { finish_reason: Some("error".into()) });
    assert!(parts.contains(&StreamPart::TextEnd { id: "text-1".into() }));

    let stored = h.store.load_messages(id).await.unwrap();
    assert_eq!(stored[1].text(), "Partial");
    assert!(!h.store.usage().await[0].success);
}

#[tokio::test]
async fn retried_message_supersedes_the_failed_reply() {
    let h = harness(MockLlm::new(vec![
        vec![
            Ok(StreamEvent::TextDelta("Partial".into())),
            Err(LlmError::Stream { kind: "overloaded_error".into(), message: "Overloaded".into() }),
        ],
        text_turn("Recovered"),
        text_turn("Sure"),
    ]));
    let id = test_helpers::seed_conversation(&h.state, None).await;
    let request = turn(id, "hi");

    run_turn(&h.state, request.clone()).await;
    run_turn(&h.state, request).await;

    let stored = h.store.load_messages(id).await.unwrap();
    let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::User, Role::Assistant]);
    assert_eq!(stored[1].text(), "Recovered");

    run_turn(&h.state, turn(id, "next")).await;

    let requests = h.llm.stream_requests.lock().unwrap();
    let replayed: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(replayed, ["user"]);
    let third = serde_json::to_string(&requests[2].messages).unwrap();
    assert!(third.contains("Recovered"));
    assert!(!third.contains("Partial"), "{third}");
}

#[tokio::test]
async fn client_disconnect_still_persists_and_releases_the_lock() {
    let h = harness(MockLlm::new(vec![text_turn("unseen")]));
    let id = test_helpers::seed_conversation(&h.state, None).await;

    let stream = start_turn(&h.state, None, turn(id, "hi")).await.unwrap();
    drop(stream);

    // Waits for the turn to finish with the lock.
    drop(h.state.locks.acquire(id).await);

    let usage = h.store.usage().await;
    assert_eq!(usage.len(), 1);
    assert!(!usage[0].success);
    assert_eq!(h.store.load_messages(id).await.unwrap().len(), 1);
}

#[test]
fn stop_reasons_map_to_finish_reasons() {
    assert_eq!(finish_reason("end_turn"), "stop");
    assert_eq!(finish_reason("stop_sequence"), "stop");
    assert_eq!(finish_reason("max_tokens"), "length");
    assert_eq!(finish_reason("tool_use"), "tool-calls");
    assert_eq!(finish_reason("content_filter"), "other");
}

#[test]
fn error_codes() {
    assert_eq!(ChatError::Timeout(Duration::from_secs(1)).error_code(), "E_TIMEOUT");
    assert!(ChatError::Timeout(Duration::from_secs(1)).retryable());
    assert!(!ChatError::InvalidInput("x".into()).retryable());
    assert_eq!(ChatError::Llm(LlmError::UnknownModel("x".into())).error_code(), "E_UNKNOWN_MODEL");
}
