//! Conversation records and the request/response bodies of the REST surface.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::message::UiMessage;

/// Title given to conversations until one is generated or set.
pub const DEFAULT_TITLE: &str = "New Chat";

// =============================================================================
// SETTINGS
// =============================================================================

/// Per-conversation toggles. Missing fields in stored JSON read as defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversationSettings {
    pub websearch: bool,
    pub extended_thinking: bool,
}

/// Partial settings update. Unspecified fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websearch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_thinking: Option<bool>,
}

impl SettingsPatch {
    #[must_use]
    pub fn apply(&self, base: ConversationSettings) -> ConversationSettings {
        ConversationSettings {
            websearch: self.websearch.unwrap_or(base.websearch),
            extended_thinking: self.extended_thinking.unwrap_or(base.extended_thinking),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.websearch.is_none() && self.extended_thinking.is_none()
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// Full conversation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub settings: ConversationSettings,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

impl Conversation {
    /// Most recent activity, used for list ordering.
    #[must_use]
    pub fn activity_at(&self) -> OffsetDateTime {
        self.last_message_at.map_or(self.updated_at, |at| at.max(self.updated_at))
    }
}

/// List row shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub message_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ConversationSummary {
    /// Local placeholder inserted before the server confirms a create.
    #[must_use]
    pub fn placeholder(id: Uuid, title: Option<&str>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            title: title.unwrap_or(DEFAULT_TITLE).to_owned(),
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Conversation plus its messages in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<UiMessage>,
}

// =============================================================================
// REQUESTS / RESPONSES
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<ConversationSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// `PATCH /api/conversations/{id}` body.
///
/// `websearch` at the top level is accepted as shorthand for
/// `settings.websearch`; the nested value wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateConversationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websearch: Option<bool>,
}

impl UpdateConversationRequest {
    #[must_use]
    pub fn settings_patch(&self) -> SettingsPatch {
        let mut patch = self.settings.unwrap_or_default();
        if patch.websearch.is_none() {
            patch.websearch = self.websearch;
        }
        patch
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.model_id.is_none() && self.settings_patch().is_empty()
    }
}

/// `POST /api/chat` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    pub conversation_id: Uuid,
    pub message: UiMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAllResponse {
    pub deleted: u64,
}

/// One entry of `GET /api/models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub id: String,
    pub provider: String,
    pub label: String,
    pub reasoning: bool,
    pub available: bool,
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
