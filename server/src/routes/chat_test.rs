use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use lume_protocol::UiMessage;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use super::*;
use crate::routes::app;
use crate::state::test_helpers::{self, MockLlm, text_turn};

fn chat_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn data_lines(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect()
}

#[tokio::test]
async fn streams_parts_then_done() {
    let state = test_helpers::test_app_state_with_llm(Arc::new(MockLlm::new(vec![text_turn("Hello")])));
    let id = test_helpers::seed_conversation(&state, None).await;
    let body = json!({
        "conversationId": id,
        "message": { "id": "client-1", "role": "user", "parts": [{ "type": "text", "text": "Hi" }] }
    });

    let response = app(state).oneshot(chat_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines = data_lines(&text);
    assert_eq!(lines.last(), Some(&DONE_SENTINEL));

    let parts: Vec<StreamPart> = lines[..lines.len() - 1]
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(matches!(parts[0], StreamPart::Start { .. }));
    assert!(parts.contains(&StreamPart::TextDelta { id: "text-1".into(), delta: "Hello".into() }));
    assert!(parts.iter().any(StreamPart::is_terminal));
}

#[tokio::test]
async fn setup_errors_are_json() {
    let state = test_helpers::test_app_state_with_llm(Arc::new(MockLlm::new(vec![])));
    let message = UiMessage::user_text("Hi");

    let missing = json!({ "conversationId": Uuid::new_v4(), "message": message });
    let response = app(state.clone()).oneshot(chat_request(&missing)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let malformed = json!({ "conversationId": "nope" });
    let response = app(state.clone()).oneshot(chat_request(&malformed)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "E_INVALID_BODY");
    assert!(body["error"].is_string());

    let id = test_helpers::seed_conversation(&state, None).await;
    let unknown_model = json!({ "conversationId": id, "message": message, "modelId": "gpt-9" });
    let response = app(state).oneshot(chat_request(&unknown_model)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn no_provider_is_400() {
    let state = test_helpers::test_app_state();
    let id = test_helpers::seed_conversation(&state, None).await;
    let body = json!({ "conversationId": id, "message": UiMessage::user_text("Hi") });

    let response = app(state).oneshot(chat_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
