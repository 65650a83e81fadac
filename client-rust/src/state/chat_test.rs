use serde_json::json;

use super::*;
use crate::net::mock::{MockApi, text_reply};

fn session(api: &Arc<MockApi>) -> ChatSession {
    ChatSession::new(api.clone(), Uuid::new_v4())
}

// =============================================================
// Streaming
// =============================================================

#[tokio::test]
async fn send_assembles_the_reply() {
    let api = Arc::new(MockApi::default());
    api.script_chat(text_reply("Hello there"));
    let mut chat = session(&api);

    let mut seen = Vec::new();
    chat.send(UiMessage::user_text("Hi"), |part| seen.push(part.clone())).await.unwrap();

    assert_eq!(chat.status(), ChatStatus::Ready);
    assert_eq!(chat.messages().len(), 2);
    assert_eq!(chat.messages()[0].text(), "Hi");
    assert_eq!(chat.messages()[1].id, "msg-1");
    assert_eq!(chat.messages()[1].role, Role::Assistant);
    assert_eq!(chat.messages()[1].text(), "Hello there");
    assert_eq!(seen.len(), 7);

    let requests = api.chat_requests.lock().unwrap();
    assert_eq!(requests[0].conversation_id, chat.conversation_id());
    assert_eq!(requests[0].message.text(), "Hi");
}

#[tokio::test]
async fn title_part_is_captured_but_not_rendered() {
    let api = Arc::new(MockApi::default());
    let mut script = text_reply("ok");
    script.insert(
        6,
        Ok(StreamPart::Data { name: TITLE_DATA_NAME.into(), id: None, data: json!({ "title": "Greetings" }), transient: true }),
    );
    api.script_chat(script);
    let mut chat = session(&api);

    chat.send(UiMessage::user_text("Hi"), |_| {}).await.unwrap();

    assert_eq!(chat.title(), Some("Greetings"));
    assert!(!chat.messages()[1].parts.iter().any(|p| matches!(p, lume_protocol::MessagePart::Data { .. })));
}

#[tokio::test]
async fn model_override_is_sent() {
    let api = Arc::new(MockApi::default());
    let mut chat = session(&api);
    chat.set_model(Some("gpt-4o".into()));

    chat.send(UiMessage::user_text("Hi"), |_| {}).await.unwrap();

    assert_eq!(api.chat_requests.lock().unwrap()[0].model_id.as_deref(), Some("gpt-4o"));
}

// =============================================================
// Failures and retry
// =============================================================

#[tokio::test]
async fn in_band_error_sets_error_state_and_keeps_partial_reply() {
    let api = Arc::new(MockApi::default());
    api.script_chat(vec![
        Ok(StreamPart::Start { message_id: "msg-1".into() }),
        Ok(StreamPart::TextStart { id: "text-1".into() }),
        Ok(StreamPart::TextDelta { id: "text-1".into(), delta: "Part".into() }),
        Ok(StreamPart::error("E_PROVIDER_STREAM", "Overloaded", true)),
        Ok(StreamPart::Finish { finish_reason: Some("error".into()) }),
    ]);
    let mut chat = session(&api);

    let err = chat.send(UiMessage::user_text("Hi"), |_| {}).await.unwrap_err();

    assert!(matches!(err, ChatError::Turn { retryable: true, .. }));
    assert_eq!(chat.status(), ChatStatus::Error);
    assert!(chat.error().unwrap().contains("Overloaded"));
    assert_eq!(chat.messages()[1].text(), "Part");
}

#[tokio::test]
async fn setup_failure_keeps_user_message() {
    let api = Arc::new(MockApi::default());
    api.fail("chat");
    let mut chat = session(&api);

    let err = chat.send(UiMessage::user_text("Hi"), |_| {}).await.unwrap_err();

    assert!(matches!(err, ChatError::Api(_)));
    assert_eq!(chat.status(), ChatStatus::Error);
    assert_eq!(chat.messages().len(), 1);
}

#[tokio::test]
async fn stream_without_finish_is_interrupted() {
    let api = Arc::new(MockApi::default());
    let mut script = text_reply("cut");
    script.truncate(4);
    api.script_chat(script);
    let mut chat = session(&api);

    let err = chat.send(UiMessage::user_text("Hi"), |_| {}).await.unwrap_err();
    assert!(matches!(err, ChatError::Interrupted));
}

#[tokio::test]
async fn retry_resends_the_same_user_message() {
    let api = Arc::new(MockApi::default());
    api.script_chat(vec![Ok(StreamPart::error("E_PROVIDER", "boom", true))]);
    api.script_chat(text_reply("second try"));
    let mut chat = session(&api);

    assert!(chat.send(UiMessage::user_text("Hi"), |_| {}).await.is_err());
    chat.retry(|_| {}).await.unwrap();

    assert_eq!(chat.status(), ChatStatus::Ready);
    assert!(chat.error().is_none());
    let texts: Vec<String> = chat.messages().iter().map(UiMessage::text).collect();
    assert_eq!(texts, ["Hi", "second try"]);

    let requests = api.chat_requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].message.id, requests[1].message.id);
}

#[tokio::test]
async fn retry_needs_a_failed_turn() {
    let api = Arc::new(MockApi::default());
    let mut chat = session(&api);
    assert!(matches!(chat.retry(|_| {}).await, Err(ChatError::NothingToRetry)));

    chat.send(UiMessage::user_text("Hi"), |_| {}).await.unwrap();
    assert!(matches!(chat.retry(|_| {}).await, Err(ChatError::NothingToRetry)));
}
