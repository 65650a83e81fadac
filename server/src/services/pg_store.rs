//! Postgres implementation of `ChatStore`.

use lume_protocol::artifact::next_version;
use lume_protocol::{
    Artifact, ArtifactKind, Conversation, ConversationSettings, ConversationSummary, MessagePart, Role, UiMessage,
};
use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::store::{ChatStore, ConversationUpdate, NewArtifact, NewConversation, StoreError, UsageRecord};

type ConversationRow = (
    Uuid,
    Option<Uuid>,
    String,
    Option<String>,
    Value,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
);

type ArtifactRow = (Uuid, Uuid, Option<String>, String, String, Value, OffsetDateTime, OffsetDateTime);

const CONVERSATION_COLUMNS: &str = "id, user_id, title, model_id, settings, created_at, updated_at, last_message_at";
const ARTIFACT_COLUMNS: &str =
    "a.id, a.conversation_id, a.message_id, a.kind, a.version, a.content, a.created_at, a.updated_at";

pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conversation_from_row(row: ConversationRow) -> Result<Conversation, StoreError> {
    let (id, user_id, title, model_id, settings, created_at, updated_at, last_message_at) = row;
    let settings: ConversationSettings =
        serde_json::from_value(settings).map_err(|e| StoreError::Corrupt(format!("conversation {id} settings: {e}")))?;
    Ok(Conversation { id, title, model_id, settings, created_at, updated_at, last_message_at, user_id })
}

fn artifact_from_row(row: ArtifactRow) -> Result<Artifact, StoreError> {
    let (id, conversation_id, message_id, kind, version, content, created_at, updated_at) = row;
    let kind = ArtifactKind::parse(&kind).ok_or_else(|| StoreError::Corrupt(format!("artifact {id} kind: {kind}")))?;
    Ok(Artifact { id, conversation_id, message_id, kind, version, content, created_at, updated_at })
}

fn settings_json(settings: ConversationSettings) -> Result<Value, StoreError> {
    serde_json::to_value(settings).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Foreign-key violations on child inserts mean the conversation is gone.
fn missing_parent(err: sqlx::Error, conversation_id: Uuid) -> StoreError {
    if matches!(&err, sqlx::Error::Database(db) if db.is_foreign_key_violation()) {
        StoreError::ConversationNotFound(conversation_id)
    } else {
        StoreError::Database(err)
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl ChatStore for PgChatStore {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation, StoreError> {
        let inserted = sqlx::query_as::<_, ConversationRow>(&format!(
            "INSERT INTO conversations (id, user_id, title, model_id, settings)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(new.id)
        .bind(new.owner)
        .bind(&new.title)
        .bind(&new.model_id)
        .bind(settings_json(new.settings)?)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => conversation_from_row(row),
            None => self
                .get_conversation(new.id, new.owner)
                .await
                .map_err(|_| StoreError::Conflict(new.id)),
        }
    }

    async fn get_conversation(&self, id: Uuid, owner: Option<Uuid>) -> Result<Conversation, StoreError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS}
             FROM conversations
             WHERE id = $1 AND user_id IS NOT DISTINCT FROM $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ConversationNotFound(id))?;
        conversation_from_row(row)
    }

    async fn list_conversations(&self, owner: Option<Uuid>) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, i64, OffsetDateTime, OffsetDateTime)>(
            "SELECT c.id, c.title,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count,
                    c.created_at, c.updated_at
             FROM conversations c
             WHERE c.user_id IS NOT DISTINCT FROM $1
             ORDER BY GREATEST(c.updated_at, c.last_message_at) DESC, c.created_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, title, message_count, created_at, updated_at)| ConversationSummary {
                id,
                title,
                message_count,
                created_at,
                updated_at,
            })
            .collect())
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        update: ConversationUpdate,
    ) -> Result<Conversation, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS}
             FROM conversations
             WHERE id = $1 AND user_id IS NOT DISTINCT FROM $2
             FOR UPDATE"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::ConversationNotFound(id))?;
        let current = conversation_from_row(current)?;

        let settings = update.settings.apply(current.settings);
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "UPDATE conversations
             SET title = COALESCE($2, title),
                 model_id = COALESCE($3, model_id),
                 settings = $4,
                 updated_at = now()
             WHERE id = $1
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.title)
        .bind(&update.model_id)
        .bind(settings_json(settings)?)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        conversation_from_row(row)
    }

    async fn delete_conversation(&self, id: Uuid, owner: Option<Uuid>) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(id));
        }
        Ok(())
    }

    async fn delete_all_conversations(&self, owner: Option<Uuid>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE user_id IS NOT DISTINCT FROM $1")
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn touch_conversation(&self, id: Uuid, last_message: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE conversations
             SET updated_at = now(),
                 last_message_at = CASE WHEN $2 THEN now() ELSE last_message_at END
             WHERE id = $1",
        )
        .bind(id)
        .bind(last_message)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(id));
        }
        Ok(())
    }

    async fn load_messages(&self, conversation_id: Uuid) -> Result<Vec<UiMessage>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, Value)>(
            "SELECT id, role, parts FROM messages WHERE conversation_id = $1 ORDER BY seq ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, role, parts)| {
                let role = Role::parse(&role).ok_or_else(|| StoreError::Corrupt(format!("message {id} role: {role}")))?;
                let parts: Vec<MessagePart> =
                    serde_json::from_value(parts).map_err(|e| StoreError::Corrupt(format!("message {id} parts: {e}")))?;
                Ok(UiMessage { id, role, parts })
            })
            .collect()
    }

    async fn append_message(&self, conversation_id: Uuid, message: &UiMessage) -> Result<bool, StoreError> {
        let parts = serde_json::to_value(&message.parts).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, parts)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (conversation_id, id) DO NOTHING",
        )
        .bind(&message.id)
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(parts)
        .execute(&self.pool)
        .await
        .map_err(|e| missing_parent(e, conversation_id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_messages_after(&self, conversation_id: Uuid, message_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM messages
             WHERE conversation_id = $1
               AND seq > (SELECT seq FROM messages WHERE conversation_id = $1 AND id = $2)",
        )
        .bind(conversation_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_artifact(&self, new: NewArtifact) -> Result<Artifact, StoreError> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            "INSERT INTO artifacts AS a (id, conversation_id, message_id, kind, version, content)
             VALUES ($1, $2, $3, $4, '1', $5)
             RETURNING a.id, a.conversation_id, a.message_id, a.kind, a.version, a.content, a.created_at, a.updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(new.conversation_id)
        .bind(&new.message_id)
        .bind(new.kind.as_str())
        .bind(&new.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_parent(e, new.conversation_id))?;
        artifact_from_row(row)
    }

    async fn get_artifact(&self, id: Uuid, owner: Option<Uuid>) -> Result<Artifact, StoreError> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {ARTIFACT_COLUMNS}
             FROM artifacts a
             JOIN conversations c ON c.id = a.conversation_id
             WHERE a.id = $1 AND c.user_id IS NOT DISTINCT FROM $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ArtifactNotFound(id))?;
        artifact_from_row(row)
    }

    async fn save_artifact(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        content: Value,
        expected_version: Option<&str>,
    ) -> Result<Artifact, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, (String,)>(
            "SELECT a.version
             FROM artifacts a
             JOIN conversations c ON c.id = a.conversation_id
             WHERE a.id = $1 AND c.user_id IS NOT DISTINCT FROM $2
             FOR UPDATE OF a",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::ArtifactNotFound(id))?;

        let (version,) = current;
        if let Some(expected) = expected_version
            && expected != version
        {
            return Err(StoreError::VersionConflict { expected: expected.to_string(), actual: version });
        }

        let row = sqlx::query_as::<_, ArtifactRow>(
            "UPDATE artifacts AS a
             SET content = $2, version = $3, updated_at = now()
             WHERE a.id = $1
             RETURNING a.id, a.conversation_id, a.message_id, a.kind, a.version, a.content, a.created_at, a.updated_at",
        )
        .bind(id)
        .bind(&content)
        .bind(next_version(&version))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        artifact_from_row(row)
    }

    async fn record_usage(&self, usage: UsageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO model_usage
                (id, conversation_id, model_id, input_tokens, output_tokens, total_tokens, cost_usd, latency_ms, success)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(usage.conversation_id)
        .bind(&usage.model_id)
        .bind(to_i64(usage.input_tokens))
        .bind(to_i64(usage.output_tokens))
        .bind(to_i64(usage.total_tokens()))
        .bind(usage.cost_usd)
        .bind(to_i64(usage.latency_ms))
        .bind(usage.success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "pg_store_test.rs"]
mod tests;
