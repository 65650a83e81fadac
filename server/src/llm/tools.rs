//! Tool definitions offered to the model.
//!
//! Names are part of the client contract: persisted `tool` parts carry them
//! and the client renders by name.

use super::types::Tool;

pub const GENERATE_OUTLINE: &str = "generateOutline";
pub const WEB_SEARCH: &str = "webSearch";
pub const WEB_EXTRACT: &str = "webExtract";

/// Tools for one provider step. The web tools are only offered when the
/// conversation enables search and a backend exists.
#[must_use]
pub fn tool_definitions(websearch: bool) -> Vec<Tool> {
    let mut tools = vec![generate_outline()];
    if websearch {
        tools.push(web_search());
        tools.push(web_extract());
    }
    tools
}

fn generate_outline() -> Tool {
    Tool {
        name: GENERATE_OUTLINE.into(),
        description: "Generate a slide deck outline organized into chapters. The outline is saved as an \
                      editable artifact the user can refine."
            .into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "outline": {
                    "type": "object",
                    "properties": {
                        "pptTitle": { "type": "string", "description": "Title of the presentation" },
                        "slidesCount": { "type": "integer", "description": "Total number of slides" },
                        "overallRequirements": { "type": "string", "description": "Audience, tone and style notes" }
                    },
                    "required": ["pptTitle", "slidesCount", "overallRequirements"]
                },
                "chapters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "chapterTitle": { "type": "string" },
                            "slides": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "slideNumber": {
                                            "type": "integer",
                                            "description": "1-based, across all chapters"
                                        },
                                        "slideTitle": { "type": "string" },
                                        "slideContent": { "type": "string", "description": "Key points for the slide" },
                                        "slideType": { "type": "string", "description": "e.g. title, content, summary" }
                                    },
                                    "required": ["slideNumber", "slideTitle", "slideContent", "slideType"]
                                }
                            }
                        },
                        "required": ["chapterTitle", "slides"]
                    }
                }
            },
            "required": ["outline", "chapters"]
        }),
    }
}

fn web_search() -> Tool {
    Tool {
        name: WEB_SEARCH.into(),
        description: "Search the web for current information. Returns titles, URLs and snippets.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "maxResults": { "type": "integer", "minimum": 1, "maximum": 10, "description": "Defaults to 5" }
            },
            "required": ["query"]
        }),
    }
}

fn web_extract() -> Tool {
    Tool {
        name: WEB_EXTRACT.into(),
        description: "Fetch the readable content of one or more web pages.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string", "format": "uri" },
                    "minItems": 1,
                    "maxItems": 5
                }
            },
            "required": ["urls"]
        }),
    }
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;
