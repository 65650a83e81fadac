//! Conversation title generation.
//!
//! Best effort: a short one-shot completion bounded by a timeout. Callers
//! log failures and keep the default title.

use std::time::Duration;

use lume_protocol::conversation::DEFAULT_TITLE;

use crate::llm::types::{ChatRequest, LlmChat, LlmError, Message};

const MAX_TITLE_CHARS: usize = 100;
const TITLE_MAX_TOKENS: u32 = 32;
const TITLE_SYSTEM_PROMPT: &str = "Generate a short, descriptive title (max 6 words) for a conversation that \
                                   starts with the user's message below. Reply with the title only, no quotes \
                                   or punctuation at the end.";

#[derive(Debug, thiserror::Error)]
pub enum TitleError {
    #[error("title generation timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Normalize a model-produced title: first line, trimmed, surrounding
/// quotes removed, capped at 100 chars. Empty input yields the default.
#[must_use]
pub fn clean_title(raw: &str) -> String {
    let first_line = raw.trim().lines().next().unwrap_or_default();
    let title = first_line.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        let mut cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
        cut.push_str("...");
        return cut;
    }
    title.to_string()
}

/// Ask `model` for a title for a conversation opening with `first_message`.
///
/// # Errors
///
/// `Timeout` if the call outlives `timeout`; `Llm` if the provider fails.
pub async fn generate_title(
    llm: &dyn LlmChat,
    model: &str,
    first_message: &str,
    timeout: Duration,
) -> Result<String, TitleError> {
    let request = ChatRequest {
        model: model.to_string(),
        max_tokens: TITLE_MAX_TOKENS,
        temperature: Some(0.3),
        system: TITLE_SYSTEM_PROMPT.to_string(),
        messages: vec![Message::user_text(first_message)],
        tools: Vec::new(),
        thinking_budget: None,
    };
    let response = tokio::time::timeout(timeout, llm.chat(&request))
        .await
        .map_err(|_| TitleError::Timeout(timeout))??;
    Ok(clean_title(&response.text()))
}
