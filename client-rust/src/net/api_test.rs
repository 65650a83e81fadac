use futures::stream;

use super::*;

fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, ApiError>> + Send + 'static {
    let chunks: Vec<Result<Bytes, ApiError>> = chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
    stream::iter(chunks)
}

// =============================================================
// decode_parts
// =============================================================

#[tokio::test]
async fn decodes_parts_split_across_chunks() {
    let parts: Vec<StreamPart> = decode_parts(body(&[
        "data: {\"type\":\"start\",\"messageId\":\"msg-1\"}\n\ndata: {\"type\":\"text-del",
        "ta\",\"id\":\"text-1\",\"delta\":\"Hi\"}\n\n",
        "data: [DONE]\n\n",
    ]))
    .map(|item| item.unwrap())
    .collect()
    .await;

    assert_eq!(
        parts,
        vec![
            StreamPart::Start { message_id: "msg-1".into() },
            StreamPart::TextDelta { id: "text-1".into(), delta: "Hi".into() },
        ]
    );
}

#[tokio::test]
async fn stops_at_done() {
    let parts: Vec<_> = decode_parts(body(&[
        "data: {\"type\":\"finish\"}\n\ndata: [DONE]\n\ndata: {\"type\":\"start-step\"}\n\n",
    ]))
    .collect()
    .await;
    assert_eq!(parts.len(), 1);
}

#[tokio::test]
async fn bad_payload_is_an_item_error_not_the_end() {
    let items: Vec<_> = decode_parts(body(&["data: {nope}\n", "data: {\"type\":\"start-step\"}\n"]))
        .collect()
        .await;
    assert!(matches!(items[0], Err(ApiError::Decode(_))));
    assert_eq!(items[1].as_ref().unwrap(), &StreamPart::StartStep);
}

#[tokio::test]
async fn unterminated_tail_is_flushed() {
    let parts: Vec<_> = decode_parts(body(&["data: {\"type\":\"start-step\"}"]))
        .collect()
        .await;
    assert_eq!(parts.len(), 1);
}

// =============================================================
// Errors
// =============================================================

#[test]
fn status_error_keeps_server_code() {
    let err = status_error(409, br#"{"error":"version mismatch","code":"E_VERSION_CONFLICT"}"#);
    assert_eq!(err.code(), "E_VERSION_CONFLICT");
    assert!(err.is_conflict());
    assert!(!err.is_not_found());
}

#[test]
fn status_error_without_json_body() {
    let err = status_error(502, b"");
    assert_eq!(err.code(), "E_HTTP_STATUS");
    assert_eq!(err.to_string(), "HTTP 502 (E_HTTP_STATUS, HTTP 502)");
}

#[test]
fn rejects_non_http_base_url() {
    assert!(matches!(HttpApi::new("localhost:3000", None), Err(ApiError::InvalidBaseUrl(_))));
    let api = HttpApi::new("http://localhost:3000/", None).unwrap();
    assert_eq!(api.base_url(), "http://localhost:3000");
}
