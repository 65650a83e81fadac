//! Persistence gateway: the `ChatStore` trait and its shared types.
//!
//! DESIGN
//! ======
//! Services talk to storage only through `ChatStore` so the chat turn,
//! conversation and artifact logic runs unchanged against Postgres
//! (`PgChatStore`) or the in-process `MemoryChatStore` used by tests and
//! by database-less development runs.
//!
//! Ownership: conversations carry an optional owner. Every owner-scoped
//! lookup compares with `IS NOT DISTINCT FROM` semantics, so anonymous
//! callers see exactly the anonymous rows. A row owned by someone else is
//! reported as not found, never as forbidden.
//!
//! Messages are append-only and keyed by `(conversation_id, id)`; a repeated
//! append of the same id is ignored so client retries cannot duplicate a
//! turn.

use lume_protocol::{
    Artifact, ArtifactKind, Conversation, ConversationSettings, ConversationSummary, SettingsPatch, UiMessage,
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ErrorCode;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),
    #[error("artifact not found: {0}")]
    ArtifactNotFound(Uuid),
    #[error("artifact version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: String, actual: String },
    #[error("conversation {0} already exists")]
    Conflict(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConversationNotFound(_) => "E_CONVERSATION_NOT_FOUND",
            Self::ArtifactNotFound(_) => "E_ARTIFACT_NOT_FOUND",
            Self::VersionConflict { .. } => "E_VERSION_CONFLICT",
            Self::Conflict(_) => "E_CONFLICT",
            Self::Database(_) => "E_DATABASE",
            Self::Corrupt(_) => "E_CORRUPT_ROW",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

// =============================================================================
// INPUTS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub id: Uuid,
    pub owner: Option<Uuid>,
    pub title: String,
    pub model_id: Option<String>,
    pub settings: ConversationSettings,
}

/// Field-wise update; `None` leaves the stored value alone and the settings
/// patch merges over stored settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub model_id: Option<String>,
    pub settings: SettingsPatch,
}

impl ConversationUpdate {
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()), ..Self::default() }
    }

    #[must_use]
    pub fn model(model_id: impl Into<String>) -> Self {
        Self { model_id: Some(model_id.into()), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub conversation_id: Uuid,
    pub message_id: Option<String>,
    pub kind: ArtifactKind,
    /// Already validated and normalized for `kind`.
    pub content: Value,
}

/// One `model_usage` row.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub conversation_id: Uuid,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub success: bool,
}

impl UsageRecord {
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    /// Insert a conversation. Re-creating an id the same owner already holds
    /// returns the existing row, so client retries are harmless.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id belongs to another owner; `Database` on failure.
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation, StoreError>;

    /// # Errors
    ///
    /// `ConversationNotFound` if absent or owned by someone else.
    async fn get_conversation(&self, id: Uuid, owner: Option<Uuid>) -> Result<Conversation, StoreError>;

    /// Summaries for `owner`, most recent activity first.
    ///
    /// # Errors
    ///
    /// `Database` on failure.
    async fn list_conversations(&self, owner: Option<Uuid>) -> Result<Vec<ConversationSummary>, StoreError>;

    /// # Errors
    ///
    /// `ConversationNotFound` if absent or owned by someone else.
    async fn update_conversation(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        update: ConversationUpdate,
    ) -> Result<Conversation, StoreError>;

    /// Delete one conversation and, by cascade, its messages, artifacts and
    /// usage rows.
    ///
    /// # Errors
    ///
    /// `ConversationNotFound` if absent or owned by someone else.
    async fn delete_conversation(&self, id: Uuid, owner: Option<Uuid>) -> Result<(), StoreError>;

    /// Delete every conversation `owner` holds; returns how many.
    ///
    /// # Errors
    ///
    /// `Database` on failure.
    async fn delete_all_conversations(&self, owner: Option<Uuid>) -> Result<u64, StoreError>;

    /// Bump `updated_at`, and `last_message_at` too when `last_message`.
    ///
    /// # Errors
    ///
    /// `ConversationNotFound` if absent.
    async fn touch_conversation(&self, id: Uuid, last_message: bool) -> Result<(), StoreError>;

    /// Messages in insertion order.
    ///
    /// # Errors
    ///
    /// `Corrupt` if a stored row does not decode.
    async fn load_messages(&self, conversation_id: Uuid) -> Result<Vec<UiMessage>, StoreError>;

    /// Append one message. Returns `false` when the id was already stored.
    ///
    /// # Errors
    ///
    /// `ConversationNotFound` if the conversation is gone.
    async fn append_message(&self, conversation_id: Uuid, message: &UiMessage) -> Result<bool, StoreError>;

    /// Delete every message stored after `message_id`. Returns how many were
    /// removed; an unknown id removes nothing.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    async fn delete_messages_after(&self, conversation_id: Uuid, message_id: &str) -> Result<u64, StoreError>;

    /// # Errors
    ///
    /// `ConversationNotFound` if the conversation is gone.
    async fn create_artifact(&self, new: NewArtifact) -> Result<Artifact, StoreError>;

    /// # Errors
    ///
    /// `ArtifactNotFound` if absent or its conversation is owned by someone
    /// else.
    async fn get_artifact(&self, id: Uuid, owner: Option<Uuid>) -> Result<Artifact, StoreError>;

    /// Replace content and bump the version. With `expected_version`, the
    /// write only happens if it matches the stored version.
    ///
    /// # Errors
    ///
    /// `ArtifactNotFound`, or `VersionConflict` on a stale `expected_version`.
    async fn save_artifact(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        content: Value,
        expected_version: Option<&str>,
    ) -> Result<Artifact, StoreError>;

    /// # Errors
    ///
    /// `Database` on failure.
    async fn record_usage(&self, usage: UsageRecord) -> Result<(), StoreError>;
}
