//! Tool execution for chat turns.
//!
//! DESIGN
//! ======
//! A tool call produces a JSON output fed back to the model plus any extra
//! stream parts the client should see (search sources, artifact
//! references). Errors never abort the turn: the orchestrator turns them
//! into `tool-output-error` parts and an `is_error` tool result, and the
//! model decides what to do next.

use lume_protocol::artifact::validate_content;
use lume_protocol::{ArtifactKind, PartialSlidesOutline, StreamPart};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use super::search::{SearchError, WebSearch};
use super::store::{ChatStore, NewArtifact, StoreError};
use crate::error::ErrorCode;
use crate::llm::tools::{GENERATE_OUTLINE, WEB_EXTRACT, WEB_SEARCH};

const DEFAULT_MAX_RESULTS: u64 = 5;
const MAX_RESULTS_CAP: u64 = 10;
const MAX_EXTRACT_URLS: usize = 5;

/// Data part name used for artifact references.
pub const ARTIFACT_DATA_NAME: &str = "artifact";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid input for {tool}: {message}")]
    InvalidInput { tool: &'static str, message: String },
    #[error("web search is not available")]
    SearchUnavailable,
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for ToolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "E_UNKNOWN_TOOL",
            Self::InvalidInput { .. } => "E_INVALID_TOOL_INPUT",
            Self::SearchUnavailable => "E_SEARCH_UNAVAILABLE",
            Self::Search(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Search(e) => e.retryable(),
            Self::Store(e) => e.retryable(),
            _ => false,
        }
    }
}

/// What a tool needs from the turn that called it.
pub struct ToolContext<'a> {
    pub store: &'a dyn ChatStore,
    pub search: Option<&'a dyn WebSearch>,
    pub conversation_id: Uuid,
    /// Assistant message the call belongs to; artifacts link back to it.
    pub message_id: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub output: Value,
    /// Extra parts to emit after `tool-output-available`.
    pub parts: Vec<StreamPart>,
}

impl ToolOutcome {
    fn output(output: Value) -> Self {
        Self { output, parts: Vec::new() }
    }
}

/// Run one tool call.
///
/// # Errors
///
/// `UnknownTool`, `InvalidInput`, or whatever the backing store or search
/// backend reports.
pub async fn execute(
    ctx: &ToolContext<'_>,
    tool_call_id: &str,
    name: &str,
    input: &Value,
) -> Result<ToolOutcome, ToolError> {
    match name {
        GENERATE_OUTLINE => generate_outline(ctx, input).await,
        WEB_SEARCH => web_search(ctx, tool_call_id, input).await,
        WEB_EXTRACT => web_extract(ctx, tool_call_id, input).await,
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

/// Best-effort view of a still-streaming tool input for the client.
#[must_use]
pub fn partial_view(name: &str, input: Value) -> Value {
    match name {
        GENERATE_OUTLINE => serde_json::to_value(PartialSlidesOutline::from_value(input)).unwrap_or(Value::Null),
        _ => input,
    }
}

// =============================================================================
// generateOutline
// =============================================================================

async fn generate_outline(ctx: &ToolContext<'_>, input: &Value) -> Result<ToolOutcome, ToolError> {
    let content = validate_content(ArtifactKind::SlidesOutline, input)
        .map_err(|e| ToolError::InvalidInput { tool: GENERATE_OUTLINE, message: e.to_string() })?;

    let artifact = ctx
        .store
        .create_artifact(NewArtifact {
            conversation_id: ctx.conversation_id,
            message_id: Some(ctx.message_id.to_string()),
            kind: ArtifactKind::SlidesOutline,
            content,
        })
        .await?;

    let ppt_title = artifact
        .content
        .pointer("/outline/pptTitle")
        .cloned()
        .unwrap_or(Value::Null);
    let slides_count = artifact
        .content
        .pointer("/outline/slidesCount")
        .cloned()
        .unwrap_or(Value::Null);
    info!(artifact_id = %artifact.id, conversation_id = %ctx.conversation_id, "tools: outline artifact created");

    let reference = StreamPart::Data {
        name: ARTIFACT_DATA_NAME.into(),
        id: Some(artifact.id.to_string()),
        data: json!({
            "artifactId": artifact.id,
            "kind": artifact.kind.as_str(),
            "version": artifact.version,
            "title": ppt_title,
        }),
        transient: false,
    };
    Ok(ToolOutcome {
        output: json!({
            "artifactId": artifact.id,
            "version": artifact.version,
            "pptTitle": ppt_title,
            "slidesCount": slides_count,
        }),
        parts: vec![reference],
    })
}

// =============================================================================
// webSearch / webExtract
// =============================================================================

fn sources<'a>(tool_call_id: &str, urls: impl Iterator<Item = (&'a str, Option<&'a str>)>) -> Vec<StreamPart> {
    urls.enumerate()
        .map(|(i, (url, title))| StreamPart::SourceUrl {
            source_id: format!("{tool_call_id}-{i}"),
            url: url.to_string(),
            title: title.map(str::to_string),
        })
        .collect()
}

async fn web_search(ctx: &ToolContext<'_>, tool_call_id: &str, input: &Value) -> Result<ToolOutcome, ToolError> {
    let search = ctx.search.ok_or(ToolError::SearchUnavailable)?;
    let query = input
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ToolError::InvalidInput { tool: WEB_SEARCH, message: "query is required".into() })?;
    let max_results = input
        .get("maxResults")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_RESULTS_CAP);
    let max_results = u32::try_from(max_results).unwrap_or(1);

    let results = search.search(query, max_results).await?;
    info!(query, results = results.len(), "tools: web search");

    let parts = sources(tool_call_id, results.iter().map(|r| (r.url.as_str(), Some(r.title.as_str()))));
    let output = serde_json::to_value(&results).unwrap_or(Value::Null);
    Ok(ToolOutcome { output, parts })
}

async fn web_extract(ctx: &ToolContext<'_>, tool_call_id: &str, input: &Value) -> Result<ToolOutcome, ToolError> {
    let search = ctx.search.ok_or(ToolError::SearchUnavailable)?;
    let invalid = |message: &str| ToolError::InvalidInput { tool: WEB_EXTRACT, message: message.to_string() };
    let urls: Vec<String> = input
        .get("urls")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("urls must be an array"))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        return Err(invalid("at least one url is required"));
    }
    if urls.len() > MAX_EXTRACT_URLS {
        return Err(invalid("too many urls"));
    }

    let pages = search.extract(&urls).await?;
    info!(urls = urls.len(), pages = pages.len(), "tools: web extract");

    let parts = sources(tool_call_id, pages.iter().map(|p| (p.url.as_str(), None)));
    if pages.is_empty() {
        return Ok(ToolOutcome::output(json!([])));
    }
    let output = serde_json::to_value(&pages).unwrap_or(Value::Null);
    Ok(ToolOutcome { output, parts })
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;
