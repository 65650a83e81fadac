//! In-process `ChatStore`.
//!
//! DESIGN
//! ======
//! Mirrors the Postgres semantics closely enough that services behave the
//! same on either backend: owner-scoped lookups, cascade on delete,
//! duplicate message ids ignored, compare-and-swap artifact saves. One
//! `RwLock` guards all tables; operations are short and never await while
//! holding it.

use std::collections::HashMap;

use lume_protocol::artifact::next_version;
use lume_protocol::{Artifact, Conversation, ConversationSummary, UiMessage};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{ChatStore, ConversationUpdate, NewArtifact, NewConversation, StoreError, UsageRecord};

#[derive(Default)]
struct Tables {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<UiMessage>>,
    artifacts: HashMap<Uuid, Artifact>,
    usage: Vec<UsageRecord>,
}

impl Tables {
    fn owned(&self, id: Uuid, owner: Option<Uuid>) -> Option<&Conversation> {
        self.conversations.get(&id).filter(|c| c.user_id == owner)
    }

    fn remove_conversation(&mut self, id: Uuid) {
        self.conversations.remove(&id);
        self.messages.remove(&id);
        self.artifacts.retain(|_, a| a.conversation_id != id);
        self.usage.retain(|u| u.conversation_id != id);
    }
}

#[derive(Default)]
pub struct MemoryChatStore {
    tables: RwLock<Tables>,
}

impl MemoryChatStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn usage(&self) -> Vec<UsageRecord> {
        self.tables.read().await.usage.clone()
    }

    #[cfg(test)]
    pub(crate) async fn artifacts(&self) -> Vec<Artifact> {
        self.tables.read().await.artifacts.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.conversations.get(&new.id) {
            return if existing.user_id == new.owner { Ok(existing.clone()) } else { Err(StoreError::Conflict(new.id)) };
        }
        let now = OffsetDateTime::now_utc();
        let conversation = Conversation {
            id: new.id,
            title: new.title,
            model_id: new.model_id,
            settings: new.settings,
            created_at: now,
            updated_at: now,
            last_message_at: None,
            user_id: new.owner,
        };
        tables.conversations.insert(new.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid, owner: Option<Uuid>) -> Result<Conversation, StoreError> {
        let tables = self.tables.read().await;
        tables.owned(id, owner).cloned().ok_or(StoreError::ConversationNotFound(id))
    }

    async fn list_conversations(&self, owner: Option<Uuid>) -> Result<Vec<ConversationSummary>, StoreError> {
        let tables = self.tables.read().await;
        let mut owned: Vec<&Conversation> = tables.conversations.values().filter(|c| c.user_id == owner).collect();
        owned.sort_by(|a, b| {
            b.activity_at()
                .cmp(&a.activity_at())
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(owned
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title.clone(),
                message_count: tables
                    .messages
                    .get(&c.id)
                    .map_or(0, |m| i64::try_from(m.len()).unwrap_or(i64::MAX)),
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
            .collect())
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        update: ConversationUpdate,
    ) -> Result<Conversation, StoreError> {
        let mut tables = self.tables.write().await;
        let conversation = tables
            .conversations
            .get_mut(&id)
            .filter(|c| c.user_id == owner)
            .ok_or(StoreError::ConversationNotFound(id))?;
        if let Some(title) = update.title {
            conversation.title = title;
        }
        if let Some(model_id) = update.model_id {
            conversation.model_id = Some(model_id);
        }
        conversation.settings = update.settings.apply(conversation.settings);
        conversation.updated_at = OffsetDateTime::now_utc();
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, id: Uuid, owner: Option<Uuid>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.owned(id, owner).is_none() {
            return Err(StoreError::ConversationNotFound(id));
        }
        tables.remove_conversation(id);
        Ok(())
    }

    async fn delete_all_conversations(&self, owner: Option<Uuid>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let ids: Vec<Uuid> = tables
            .conversations
            .values()
            .filter(|c| c.user_id == owner)
            .map(|c| c.id)
            .collect();
        for id in &ids {
            tables.remove_conversation(*id);
        }
        Ok(ids.len() as u64)
    }

    async fn touch_conversation(&self, id: Uuid, last_message: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let conversation = tables
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        let now = OffsetDateTime::now_utc();
        conversation.updated_at = now;
        if last_message {
            conversation.last_message_at = Some(now);
        }
        Ok(())
    }

    async fn load_messages(&self, conversation_id: Uuid) -> Result<Vec<UiMessage>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.messages.get(&conversation_id).cloned().unwrap_or_default())
    }

    async fn append_message(&self, conversation_id: Uuid, message: &UiMessage) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id));
        }
        let log = tables.messages.entry(conversation_id).or_default();
        if log.iter().any(|m| m.id == message.id) {
            return Ok(false);
        }
        log.push(message.clone());
        Ok(true)
    }

    async fn delete_messages_after(&self, conversation_id: Uuid, message_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(log) = tables.messages.get_mut(&conversation_id) else {
            return Ok(0);
        };
        let Some(pos) = log.iter().position(|m| m.id == message_id) else {
            return Ok(0);
        };
        let removed = log.drain(pos + 1..).count();
        Ok(removed as u64)
    }

    async fn create_artifact(&self, new: NewArtifact) -> Result<Artifact, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&new.conversation_id) {
            return Err(StoreError::ConversationNotFound(new.conversation_id));
        }
        let now = OffsetDateTime::now_utc();
        let artifact = Artifact {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            message_id: new.message_id,
            kind: new.kind,
            version: "1".into(),
            content: new.content,
            created_at: now,
            updated_at: now,
        };
        tables.artifacts.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    async fn get_artifact(&self, id: Uuid, owner: Option<Uuid>) -> Result<Artifact, StoreError> {
        let tables = self.tables.read().await;
        tables
            .artifacts
            .get(&id)
            .filter(|a| tables.owned(a.conversation_id, owner).is_some())
            .cloned()
            .ok_or(StoreError::ArtifactNotFound(id))
    }

    async fn save_artifact(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        content: Value,
        expected_version: Option<&str>,
    ) -> Result<Artifact, StoreError> {
        let mut tables = self.tables.write().await;
        let conversation_id = tables
            .artifacts
            .get(&id)
            .map(|a| a.conversation_id)
            .ok_or(StoreError::ArtifactNotFound(id))?;
        if tables.owned(conversation_id, owner).is_none() {
            return Err(StoreError::ArtifactNotFound(id));
        }
        let artifact = tables
            .artifacts
            .get_mut(&id)
            .ok_or(StoreError::ArtifactNotFound(id))?;
        if let Some(expected) = expected_version
            && expected != artifact.version
        {
            return Err(StoreError::VersionConflict {
                expected: expected.to_string(),
                actual: artifact.version.clone(),
            });
        }
        artifact.content = content;
        artifact.version = next_version(&artifact.version);
        artifact.updated_at = OffsetDateTime::now_utc();
        Ok(artifact.clone())
    }

    async fn record_usage(&self, usage: UsageRecord) -> Result<(), StoreError> {
        self.tables.write().await.usage.push(usage);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_store_test.rs"]
mod tests;
