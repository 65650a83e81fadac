//! One conversation's chat session.
//!
//! Sends a user message, folds the streamed parts into the in-progress
//! assistant message with the same `MessageAssembler` the server persists
//! with, and records an error state when the turn fails so the last user
//! turn can be retried.

use std::sync::Arc;

use futures::StreamExt;
use lume_protocol::{ChatTurnRequest, MessageAssembler, Role, StreamPart, UiMessage};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::net::api::{ApiError, ChatApi};

#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

/// Name of the transient data part carrying a generated title.
pub const TITLE_DATA_NAME: &str = "title";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatStatus {
    #[default]
    Ready,
    Streaming,
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("assistant turn failed: {message} ({code})")]
    Turn { code: String, message: String, retryable: bool },
    #[error("stream ended before the turn finished")]
    Interrupted,
    #[error("no failed turn to retry")]
    NothingToRetry,
}

pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    conversation_id: Uuid,
    model_id: Option<String>,
    messages: Vec<UiMessage>,
    status: ChatStatus,
    error: Option<String>,
    title: Option<String>,
}

impl ChatSession {
    #[must_use]
    pub fn new(api: Arc<dyn ChatApi>, conversation_id: Uuid) -> Self {
        Self {
            api,
            conversation_id,
            model_id: None,
            messages: Vec::new(),
            status: ChatStatus::Ready,
            error: None,
            title: None,
        }
    }

    /// Start from previously stored messages.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<UiMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn set_model(&mut self, model_id: Option<String>) {
        self.model_id = model_id;
    }

    #[must_use]
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    #[must_use]
    pub fn messages(&self) -> &[UiMessage] {
        &self.messages
    }

    #[must_use]
    pub fn status(&self) -> ChatStatus {
        self.status
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Title generated by the server during this session, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Send a user message and stream the reply. `on_part` sees every part
    /// as it arrives.
    ///
    /// # Errors
    ///
    /// Returns the failure after recording it on the session; the user
    /// message and any partial reply stay in `messages`.
    pub async fn send<F>(&mut self, message: UiMessage, on_part: F) -> Result<(), ChatError>
    where
        F: FnMut(&StreamPart),
    {
        self.messages.push(message.clone());
        self.run(message, on_part).await
    }

    /// Resend the last user message after a failed turn, dropping the
    /// partial reply. The message keeps its id, so the server does not store
    /// it twice.
    ///
    /// # Errors
    ///
    /// `NothingToRetry` unless the last turn failed; otherwise as `send`.
    pub async fn retry<F>(&mut self, on_part: F) -> Result<(), ChatError>
    where
        F: FnMut(&StreamPart),
    {
        if self.status != ChatStatus::Error {
            return Err(ChatError::NothingToRetry);
        }
        let Some(position) = self.messages.iter().rposition(|m| m.role == Role::User) else {
            return Err(ChatError::NothingToRetry);
        };
        self.messages.truncate(position + 1);
        let message = self.messages[position].clone();
        info!(conversation_id = %self.conversation_id, message_id = %message.id, "chat: retrying turn");
        self.run(message, on_part).await
    }

    async fn run<F>(&mut self, message: UiMessage, mut on_part: F) -> Result<(), ChatError>
    where
        F: FnMut(&StreamPart),
    {
        self.status = ChatStatus::Streaming;
        self.error = None;
        let request =
            ChatTurnRequest { conversation_id: self.conversation_id, message, model_id: self.model_id.clone() };

        let mut stream = match self.api.send_chat(&request).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e.into())),
        };

        let mut assembler = MessageAssembler::new(String::new());
        let slot = self.messages.len();
        self.messages.push(assembler.message());

        let mut failure = None;
        while let Some(item) = stream.next().await {
            let part = match item {
                Ok(part) => part,
                Err(e) => return Err(self.fail(e.into())),
            };
            if let StreamPart::Data { name, data, transient: true, .. } = &part
                && name == TITLE_DATA_NAME
            {
                self.title = data.get("title").and_then(Value::as_str).map(str::to_owned);
            }
            assembler.apply(&part);
            self.messages[slot] = assembler.message();
            on_part(&part);

            if let StreamPart::Error { error_text, code, retryable } = part
                && failure.is_none()
            {
                failure = Some(ChatError::Turn { code, message: error_text, retryable });
            }
        }

        if let Some(failure) = failure {
            return Err(self.fail(failure));
        }
        if !assembler.is_finished() {
            return Err(self.fail(ChatError::Interrupted));
        }
        self.status = ChatStatus::Ready;
        Ok(())
    }

    fn fail(&mut self, error: ChatError) -> ChatError {
        warn!(conversation_id = %self.conversation_id, error = %error, "chat: turn failed");
        self.status = ChatStatus::Error;
        self.error = Some(error.to_string());
        error
    }
}
