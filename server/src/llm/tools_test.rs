use super::*;

fn names(tools: &[Tool]) -> Vec<&str> {
    tools.iter().map(|t| t.name.as_str()).collect()
}

#[test]
fn outline_tool_is_always_offered() {
    assert_eq!(names(&tool_definitions(false)), vec![GENERATE_OUTLINE]);
}

#[test]
fn web_tools_follow_the_setting() {
    assert_eq!(names(&tool_definitions(true)), vec![GENERATE_OUTLINE, WEB_SEARCH, WEB_EXTRACT]);
}

#[test]
fn schema_shape_is_object() {
    for tool in &tool_definitions(true) {
        assert_eq!(
            tool.input_schema.get("type").and_then(|v| v.as_str()),
            Some("object"),
            "tool {} schema should be type=object",
            tool.name
        );
        assert!(!tool.description.is_empty());
    }
}

#[test]
fn outline_schema_uses_wire_field_names() {
    let tools = tool_definitions(false);
    let schema = &tools[0].input_schema;
    assert!(schema.pointer("/properties/outline/properties/pptTitle").is_some());
    assert!(
        schema
            .pointer("/properties/chapters/items/properties/slides/items/properties/slideNumber")
            .is_some()
    );
}
