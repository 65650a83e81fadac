//! Stored messages → provider messages.
//!
//! DESIGN
//! ======
//! Replay keeps stored order exactly. Only what the model needs to continue
//! the conversation is replayed: text, file references, and tool calls that
//! reached an output (as `tool_use` followed by a user `tool_result`).
//! Reasoning, sources, data parts and step markers are presentation-only.
//! Each `step-start` inside an assistant message opens a new provider turn,
//! so a multi-step answer replays as assistant / tool-result pairs in the
//! order the model produced them. Adjacent messages with the same role are
//! merged because providers require alternating roles.

use lume_protocol::{MessagePart, Role, ToolState, UiMessage};

use crate::llm::types::{Content, ContentBlock, Message};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderHistory {
    /// Text of stored system messages, appended to the system prompt.
    pub system: Vec<String>,
    pub messages: Vec<Message>,
}

impl ProviderHistory {
    /// Base prompt followed by any stored system text.
    #[must_use]
    pub fn system_prompt(&self, base: &str) -> String {
        let mut prompt = base.to_string();
        for extra in &self.system {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str(extra);
        }
        prompt
    }
}

#[must_use]
pub fn to_provider_history(history: &[UiMessage]) -> ProviderHistory {
    let mut out = ProviderHistory::default();
    for message in history {
        match message.role {
            Role::System => {
                let text = message.text();
                if !text.trim().is_empty() {
                    out.system.push(text);
                }
            }
            Role::User => push_blocks(&mut out.messages, "user", user_blocks(&message.parts)),
            Role::Assistant => {
                for step in message.parts.split(|part| matches!(part, MessagePart::StepStart)) {
                    let (calls, results) = assistant_step(step);
                    push_blocks(&mut out.messages, "assistant", calls);
                    push_blocks(&mut out.messages, "user", results);
                }
            }
            // Tool output lives on the assistant's tool parts.
            Role::Tool => {}
        }
    }
    out
}

fn user_blocks(parts: &[MessagePart]) -> Vec<ContentBlock> {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } if !text.is_empty() => Some(ContentBlock::Text { text: text.clone() }),
            MessagePart::File { media_type, url, filename } => {
                Some(ContentBlock::Text { text: file_reference(media_type, url, filename.as_deref()) })
            }
            _ => None,
        })
        .collect()
}

fn file_reference(media_type: &str, url: &str, filename: Option<&str>) -> String {
    let name = filename.unwrap_or("attachment");
    if url.starts_with("data:") {
        format!("[Attached file: {name} ({media_type}), inline content omitted]")
    } else {
        format!("[Attached file: {name} ({media_type}) at {url}]")
    }
}

fn assistant_step(parts: &[MessagePart]) -> (Vec<ContentBlock>, Vec<ContentBlock>) {
    let mut calls = Vec::new();
    let mut results = Vec::new();
    for part in parts {
        match part {
            MessagePart::Text { text } if !text.is_empty() => calls.push(ContentBlock::Text { text: text.clone() }),
            MessagePart::Tool { tool_call_id, tool_name, state, input, output, error_text } => {
                let (content, is_error) = match state {
                    ToolState::OutputAvailable => (
                        output
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "null".to_string()),
                        None,
                    ),
                    ToolState::OutputError => (error_text.clone().unwrap_or_default(), Some(true)),
                    // Never answered; replaying the call would leave it dangling.
                    ToolState::InputStreaming | ToolState::InputAvailable => continue,
                };
                calls.push(ContentBlock::ToolUse {
                    id: tool_call_id.clone(),
                    name: tool_name.clone(),
                    input: input.clone(),
                });
                results.push(ContentBlock::ToolResult { tool_use_id: tool_call_id.clone(), content, is_error });
            }
            MessagePart::Text { .. }
            | MessagePart::Reasoning { .. }
            | MessagePart::File { .. }
            | MessagePart::SourceUrl { .. }
            | MessagePart::Data { .. }
            | MessagePart::StepStart => {}
        }
    }
    (calls, results)
}

fn push_blocks(messages: &mut Vec<Message>, role: &str, blocks: Vec<ContentBlock>) {
    if blocks.is_empty() {
        return;
    }
    if let Some(last) = messages.last_mut()
        && last.role == role
        && let Content::Blocks(existing) = &mut last.content
    {
        existing.extend(blocks);
        return;
    }
    messages.push(Message { role: role.to_string(), content: Content::Blocks(blocks) });
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
