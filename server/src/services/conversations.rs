//! Conversation service: CRUD over the store, scoped to the caller.
//!
//! Input validation lives here (titles, model ids); ownership scoping and
//! cascade deletes are the store's job.

use lume_protocol::conversation::DEFAULT_TITLE;
use lume_protocol::{
    Conversation, ConversationDetail, ConversationSummary, CreateConversationRequest, CreateConversationResponse,
    UpdateConversationRequest,
};
use tracing::info;
use uuid::Uuid;

use super::store::{ChatStore, ConversationUpdate, NewConversation, StoreError};
use crate::error::ErrorCode;
use crate::llm::registry;

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conversation not found: {0}")]
    NotFound(Uuid),
    #[error("conversation {0} already exists")]
    Conflict(Uuid),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ConversationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(id) => Self::NotFound(id),
            StoreError::Conflict(id) => Self::Conflict(id),
            other => Self::Store(other),
        }
    }
}

impl ErrorCode for ConversationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "E_INVALID_INPUT",
            Self::NotFound(_) => "E_CONVERSATION_NOT_FOUND",
            Self::Conflict(_) => "E_CONFLICT",
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.retryable())
    }
}

fn validate_title(raw: &str) -> Result<String, ConversationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ConversationError::InvalidInput("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ConversationError::InvalidInput(format!("title exceeds {MAX_TITLE_CHARS} characters")));
    }
    Ok(title.to_string())
}

fn validate_model(model_id: &str) -> Result<String, ConversationError> {
    registry::find(model_id)
        .map(|model| model.id.to_string())
        .ok_or_else(|| ConversationError::InvalidInput(format!("unknown model: {model_id}")))
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// # Errors
///
/// Returns a store error if the listing fails.
pub async fn list(store: &dyn ChatStore, owner: Option<Uuid>) -> Result<Vec<ConversationSummary>, ConversationError> {
    Ok(store.list_conversations(owner).await?)
}

/// Create a conversation, honoring a client-supplied id.
///
/// # Errors
///
/// `InvalidInput` for a blank title or unknown model, `Conflict` when the id
/// belongs to another owner.
pub async fn create(
    store: &dyn ChatStore,
    owner: Option<Uuid>,
    request: CreateConversationRequest,
) -> Result<CreateConversationResponse, ConversationError> {
    let title = match request.title.as_deref() {
        Some(title) => validate_title(title)?,
        None => DEFAULT_TITLE.to_string(),
    };
    let model_id = request.model_id.as_deref().map(validate_model).transpose()?;
    let conversation = store
        .create_conversation(NewConversation {
            id: request.id.unwrap_or_else(Uuid::new_v4),
            owner,
            title,
            model_id,
            settings: request.settings.unwrap_or_default(),
        })
        .await?;
    info!(conversation_id = %conversation.id, "conversations: created");
    Ok(CreateConversationResponse { id: conversation.id, created_at: conversation.created_at })
}

/// Conversation with its messages in insertion order.
///
/// # Errors
///
/// `NotFound` if absent or owned by someone else.
pub async fn get(
    store: &dyn ChatStore,
    id: Uuid,
    owner: Option<Uuid>,
) -> Result<ConversationDetail, ConversationError> {
    let conversation = store.get_conversation(id, owner).await?;
    let messages = store.load_messages(id).await?;
    Ok(ConversationDetail { conversation, messages })
}

/// Apply a partial update. Unspecified settings keep their stored values.
///
/// # Errors
///
/// `InvalidInput` for a blank title or unknown model, `NotFound` if absent.
pub async fn update(
    store: &dyn ChatStore,
    id: Uuid,
    owner: Option<Uuid>,
    request: UpdateConversationRequest,
) -> Result<Conversation, ConversationError> {
    if request.is_empty() {
        return Ok(store.get_conversation(id, owner).await?);
    }
    let update = ConversationUpdate {
        title: request.title.as_deref().map(validate_title).transpose()?,
        model_id: request.model_id.as_deref().map(validate_model).transpose()?,
        settings: request.settings_patch(),
    };
    let conversation = store.update_conversation(id, owner, update).await?;
    info!(conversation_id = %id, "conversations: updated");
    Ok(conversation)
}

/// # Errors
///
/// `NotFound` if absent or owned by someone else.
pub async fn delete(store: &dyn ChatStore, id: Uuid, owner: Option<Uuid>) -> Result<(), ConversationError> {
    store.delete_conversation(id, owner).await?;
    info!(conversation_id = %id, "conversations: deleted");
    Ok(())
}

/// Delete every conversation the caller owns; returns how many.
///
/// # Errors
///
/// Returns a store error if the delete fails.
pub async fn delete_all(store: &dyn ChatStore, owner: Option<Uuid>) -> Result<u64, ConversationError> {
    let deleted = store.delete_all_conversations(owner).await?;
    info!(deleted, "conversations: deleted all");
    Ok(deleted)
}
