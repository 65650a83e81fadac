use lume_protocol::{ConversationSettings, SlidesOutline};

use super::*;
use crate::services::memory_store::MemoryChatStore;
use crate::services::search::{ExtractedPage, SearchResult};
use crate::services::store::NewConversation;

struct StubSearch;

#[async_trait::async_trait]
impl WebSearch for StubSearch {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchResult>, SearchError> {
        Ok((0..max_results.min(2))
            .map(|i| SearchResult {
                title: format!("{query} {i}"),
                url: format!("https://example.com/{i}"),
                content: String::new(),
            })
            .collect())
    }

    async fn extract(&self, urls: &[String]) -> Result<Vec<ExtractedPage>, SearchError> {
        Ok(urls
            .iter()
            .map(|url| ExtractedPage { url: url.clone(), raw_content: "body".into() })
            .collect())
    }
}

async fn store_with_conversation() -> (MemoryChatStore, Uuid) {
    let store = MemoryChatStore::new();
    let id = Uuid::new_v4();
    store
        .create_conversation(NewConversation {
            id,
            owner: None,
            title: "New Chat".into(),
            model_id: None,
            settings: ConversationSettings::default(),
        })
        .await
        .unwrap();
    (store, id)
}

fn outline_input() -> Value {
    json!({
        "outline": { "pptTitle": "Rust 101", "slidesCount": 99, "overallRequirements": "beginners" },
        "chapters": [
            { "chapterTitle": "Intro", "slides": [
                { "slideNumber": 7, "slideTitle": "Why", "slideContent": "safety", "slideType": "title" },
                { "slideNumber": 8, "slideTitle": "How", "slideContent": "cargo", "slideType": "content" }
            ] },
            { "chapterTitle": "Empty", "slides": [] }
        ]
    })
}

#[tokio::test]
async fn generate_outline_creates_normalized_artifact() {
    let (store, conversation_id) = store_with_conversation().await;
    let ctx = ToolContext { store: &store, search: None, conversation_id, message_id: "msg-1" };

    let outcome = execute(&ctx, "call_1", GENERATE_OUTLINE, &outline_input())
        .await
        .unwrap();

    assert_eq!(outcome.output["pptTitle"], "Rust 101");
    assert_eq!(outcome.output["slidesCount"], 2);
    assert_eq!(outcome.output["version"], "1");

    let artifacts = store.artifacts().await;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].message_id.as_deref(), Some("msg-1"));
    let outline: SlidesOutline = serde_json::from_value(artifacts[0].content.clone()).unwrap();
    assert!(outline.is_consistent());
    assert_eq!(outline.chapters.len(), 1);

    assert!(matches!(
        outcome.parts.as_slice(),
        [StreamPart::Data { name, transient: false, .. }] if name == ARTIFACT_DATA_NAME
    ));
}

#[tokio::test]
async fn generate_outline_rejects_bad_shape() {
    let (store, conversation_id) = store_with_conversation().await;
    let ctx = ToolContext { store: &store, search: None, conversation_id, message_id: "msg-1" };

    let err = execute(&ctx, "call_1", GENERATE_OUTLINE, &json!({ "chapters": "nope" }))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "E_INVALID_TOOL_INPUT");
    assert!(store.artifacts().await.is_empty());
}

#[tokio::test]
async fn web_search_emits_sources() {
    let (store, conversation_id) = store_with_conversation().await;
    let ctx = ToolContext { store: &store, search: Some(&StubSearch), conversation_id, message_id: "msg-1" };

    let outcome = execute(&ctx, "call_9", WEB_SEARCH, &json!({ "query": "rust", "maxResults": 50 }))
        .await
        .unwrap();
    assert_eq!(outcome.output.as_array().map(Vec::len), Some(2));
    assert_eq!(
        outcome.parts[0],
        StreamPart::SourceUrl {
            source_id: "call_9-0".into(),
            url: "https://example.com/0".into(),
            title: Some("rust 0".into()),
        }
    );
}

#[tokio::test]
async fn web_tools_need_a_backend_and_valid_input() {
    let (store, conversation_id) = store_with_conversation().await;
    let without = ToolContext { store: &store, search: None, conversation_id, message_id: "msg-1" };
    assert!(matches!(
        execute(&without, "c", WEB_SEARCH, &json!({ "query": "x" })).await,
        Err(ToolError::SearchUnavailable)
    ));

    let with = ToolContext { store: &store, search: Some(&StubSearch), conversation_id, message_id: "msg-1" };
    assert!(matches!(
        execute(&with, "c", WEB_SEARCH, &json!({ "query": "  " })).await,
        Err(ToolError::InvalidInput { .. })
    ));
    assert!(matches!(
        execute(&with, "c", WEB_EXTRACT, &json!({ "urls": [] })).await,
        Err(ToolError::InvalidInput { .. })
    ));

    let pages = execute(&with, "c", WEB_EXTRACT, &json!({ "urls": ["https://a.test"] }))
        .await
        .unwrap();
    assert_eq!(pages.output[0]["rawContent"], "body");
    assert_eq!(pages.parts.len(), 1);
}

#[tokio::test]
async fn unknown_tool_is_an_error() {
    let (store, conversation_id) = store_with_conversation().await;
    let ctx = ToolContext { store: &store, search: None, conversation_id, message_id: "msg-1" };
    let err = execute(&ctx, "c", "launchRocket", &json!({})).await.unwrap_err();
    assert_eq!(err.error_code(), "E_UNKNOWN_TOOL");
}

#[test]
fn partial_view_shapes_outline_input() {
    let view = partial_view(
        GENERATE_OUTLINE,
        json!({ "outline": { "pptTitle": "Dra" }, "chapters": [{ "chapterTitle": 3 }] }),
    );
    assert_eq!(view["outline"]["pptTitle"], "Dra");
    assert_eq!(view["chapters"][0]["chapterTitle"], 3);

    let passthrough = partial_view(WEB_SEARCH, json!({ "query": "ru" }));
    assert_eq!(passthrough, json!({ "query": "ru" }));
}
