use super::*;
use serde_json::json;

fn fold(parts: &[StreamPart]) -> MessageAssembler {
    let mut assembler = MessageAssembler::new("msg-test");
    for part in parts {
        assembler.apply(part);
    }
    assembler
}

#[test]
fn wire_names_are_kebab_case_with_camel_fields() {
    let part = StreamPart::ToolInputDelta { tool_call_id: "c1".into(), input_text_delta: "{\"a".into() };
    let value = serde_json::to_value(&part).unwrap();
    assert_eq!(value, json!({ "type": "tool-input-delta", "toolCallId": "c1", "inputTextDelta": "{\"a" }));

    let value = serde_json::to_value(StreamPart::StartStep).unwrap();
    assert_eq!(value, json!({ "type": "start-step" }));
}

#[test]
fn error_part_carries_code_and_retryable() {
    let data = StreamPart::error("E_TIMEOUT", "turn timed out", true).to_sse_data().unwrap();
    let back: StreamPart = serde_json::from_str(&data).unwrap();
    assert_eq!(
        back,
        StreamPart::Error { error_text: "turn timed out".into(), code: "E_TIMEOUT".into(), retryable: true }
    );
}

#[test]
fn text_deltas_accumulate_into_one_part() {
    let assembler = fold(&[
        StreamPart::Start { message_id: "msg-1".into() },
        StreamPart::StartStep,
        StreamPart::TextStart { id: "t0".into() },
        StreamPart::TextDelta { id: "t0".into(), delta: "Hel".into() },
        StreamPart::TextDelta { id: "t0".into(), delta: "lo".into() },
        StreamPart::TextEnd { id: "t0".into() },
        StreamPart::FinishStep,
        StreamPart::Finish { finish_reason: Some("stop".into()) },
    ]);
    let message = assembler.message();
    assert_eq!(message.id, "msg-1");
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.parts, vec![MessagePart::StepStart, MessagePart::text("Hello")]);
    assert!(assembler.is_finished());
    assert_eq!(assembler.finish_reason(), Some("stop"));
}

#[test]
fn delta_without_start_opens_part() {
    let assembler = fold(&[StreamPart::ReasoningDelta { id: "r".into(), delta: "think".into() }]);
    assert_eq!(assembler.parts(), &[MessagePart::Reasoning { text: "think".into() }]);
}

#[test]
fn tool_lifecycle_updates_single_part() {
    let assembler = fold(&[
        StreamPart::ToolInputStart { tool_call_id: "c1".into(), tool_name: "webSearch".into() },
        StreamPart::ToolInputDelta { tool_call_id: "c1".into(), input_text_delta: "{\"query\":\"ru".into() },
        StreamPart::ToolInputPartial { tool_call_id: "c1".into(), input: json!({ "query": "ru" }) },
        StreamPart::ToolInputAvailable {
            tool_call_id: "c1".into(),
            tool_name: "webSearch".into(),
            input: json!({ "query": "rust" }),
        },
        StreamPart::ToolOutputAvailable { tool_call_id: "c1".into(), output: json!({ "results": [] }) },
    ]);
    assert_eq!(assembler.parts().len(), 1);
    match &assembler.parts()[0] {
        MessagePart::Tool { state, input, output, .. } => {
            assert_eq!(*state, ToolState::OutputAvailable);
            assert_eq!(input, &json!({ "query": "rust" }));
            assert_eq!(output, &Some(json!({ "results": [] })));
        }
        other => panic!("unexpected part {other:?}"),
    }
}

#[test]
fn tool_error_records_text() {
    let assembler = fold(&[
        StreamPart::ToolInputAvailable { tool_call_id: "c1".into(), tool_name: "nope".into(), input: json!({}) },
        StreamPart::ToolOutputError { tool_call_id: "c1".into(), error_text: "unknown tool".into() },
    ]);
    match &assembler.parts()[0] {
        MessagePart::Tool { state, error_text, .. } => {
            assert_eq!(*state, ToolState::OutputError);
            assert_eq!(error_text.as_deref(), Some("unknown tool"));
        }
        other => panic!("unexpected part {other:?}"),
    }
}

#[test]
fn transient_data_is_not_assembled() {
    let assembler = fold(&[
        StreamPart::Data { name: "title".into(), id: None, data: json!("Greeting"), transient: true },
        StreamPart::Data { name: "artifact".into(), id: Some("a1".into()), data: json!({ "v": 1 }), transient: false },
        StreamPart::Data { name: "artifact".into(), id: Some("a1".into()), data: json!({ "v": 2 }), transient: false },
    ]);
    assert_eq!(
        assembler.parts(),
        &[MessagePart::Data { name: "artifact".into(), id: Some("a1".into()), data: json!({ "v": 2 }) }]
    );
}

#[test]
fn has_content_ignores_step_markers_and_empty_text() {
    let assembler = fold(&[StreamPart::StartStep, StreamPart::TextStart { id: "t".into() }]);
    assert!(!assembler.has_content());
    let assembler = fold(&[StreamPart::SourceUrl { source_id: "s".into(), url: "https://a.b".into(), title: None }]);
    assert!(assembler.has_content());
}

#[test]
fn error_part_is_recorded() {
    let assembler = fold(&[
        StreamPart::TextDelta { id: "t".into(), delta: "partial".into() },
        StreamPart::error("E_LLM_HTTP", "upstream 500", true),
        StreamPart::Finish { finish_reason: Some("error".into()) },
    ]);
    assert_eq!(assembler.error(), Some("upstream 500"));
    assert_eq!(assembler.into_message().text(), "partial");
}
