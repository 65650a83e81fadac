//! Optimistic conversation list.
//!
//! DESIGN
//! ======
//! `ConversationStore` is a cheap-to-clone handle over one
//! `ConversationsState` published through a `tokio::sync::watch` channel.
//! Every mutation goes through a named action (`add`, `delete`, `clear_all`,
//! `update`, `refresh`).
//!
//! Mutating actions snapshot the list, apply their effect locally and publish
//! before the request is sent, then either keep the result or put the
//! snapshot back and record a `Notice`. `add` mints the conversation id
//! locally so a message send can be linked to the new conversation before the
//! server has confirmed it.

use std::mem;
use std::sync::Arc;

use lume_protocol::{
    Conversation, ConversationSettings, ConversationSummary, CreateConversationRequest, UpdateConversationRequest,
};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::net::api::{ApiError, ConversationApi};

#[cfg(test)]
#[path = "conversations_test.rs"]
mod conversations_test;

/// A user-facing error raised by a rolled-back action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub action: &'static str,
    pub code: String,
    pub message: String,
}

impl Notice {
    fn new(action: &'static str, error: &ApiError) -> Self {
        Self { action, code: error.code().to_owned(), message: format!("could not {action} conversation: {error}") }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationsState {
    /// Server order: most recent activity first.
    pub conversations: Vec<ConversationSummary>,
    pub loading: bool,
    pub notices: Vec<Notice>,
}

impl ConversationsState {
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|c| c.id == id)
    }
}

#[derive(Clone)]
pub struct ConversationStore {
    api: Arc<dyn ConversationApi>,
    state: Arc<watch::Sender<ConversationsState>>,
}

impl ConversationStore {
    #[must_use]
    pub fn new(api: Arc<dyn ConversationApi>) -> Self {
        let (state, _) = watch::channel(ConversationsState::default());
        Self { api, state: Arc::new(state) }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationsState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ConversationsState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.state.borrow().conversations.clone()
    }

    /// Drain the notices recorded so far.
    pub fn take_notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        self.state.send_modify(|s| notices = mem::take(&mut s.notices));
        notices
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Replace the list with the server's. On failure the current list stays.
    ///
    /// # Errors
    ///
    /// Returns the API error after recording it as a notice.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.state.send_modify(|s| s.loading = true);
        match self.api.list_conversations().await {
            Ok(list) => {
                self.state.send_modify(|s| {
                    s.conversations = list;
                    s.loading = false;
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "conversations: refresh failed");
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.notices.push(Notice::new("load", &e));
                });
                Err(e)
            }
        }
    }

    /// Insert a placeholder at the top and return the pending create.
    ///
    /// The id is minted here (unless the request carries one) and is final:
    /// the server stores the conversation under it.
    pub fn add(&self, request: CreateConversationRequest) -> PendingCreate {
        let id = request.id.unwrap_or_else(Uuid::new_v4);
        let request = CreateConversationRequest { id: Some(id), ..request };
        let placeholder = ConversationSummary::placeholder(id, request.title.as_deref());
        self.state.send_modify(|s| s.conversations.insert(0, placeholder));
        PendingCreate { id, store: self.clone(), request }
    }

    /// # Errors
    ///
    /// Returns the API error after restoring the list.
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let snapshot = self.apply(|list| list.retain(|c| c.id != id));
        match self.api.delete_conversation(id).await {
            Ok(()) => {
                info!(%id, "conversations: deleted");
                Ok(())
            }
            Err(e) => Err(self.rollback(snapshot, "delete", e)),
        }
    }

    /// # Errors
    ///
    /// Returns the API error after restoring the list.
    pub async fn clear_all(&self) -> Result<u64, ApiError> {
        let snapshot = self.apply(Vec::clear);
        match self.api.delete_all_conversations().await {
            Ok(deleted) => {
                info!(deleted, "conversations: cleared");
                Ok(deleted)
            }
            Err(e) => Err(self.rollback(snapshot, "clear", e)),
        }
    }

    /// Rename or change settings. The title shows immediately; the server's
    /// row then replaces the local guess.
    ///
    /// # Errors
    ///
    /// Returns the API error after restoring the list.
    pub async fn update(&self, id: Uuid, patch: UpdateConversationRequest) -> Result<Conversation, ApiError> {
        let title = patch.title.as_deref().map(str::trim).map(str::to_owned);
        let snapshot = self.apply(|list| {
            if let Some(title) = title
                && let Some(row) = list.iter_mut().find(|c| c.id == id)
            {
                row.title = title;
            }
        });
        match self.api.update_conversation(id, &patch).await {
            Ok(conversation) => {
                self.state.send_modify(|s| {
                    if let Some(row) = s.conversations.iter_mut().find(|c| c.id == id) {
                        row.title.clone_from(&conversation.title);
                        row.updated_at = conversation.updated_at;
                    }
                });
                Ok(conversation)
            }
            Err(e) => Err(self.rollback(snapshot, "update", e)),
        }
    }

    /// Toggle web search, keeping the other settings.
    ///
    /// # Errors
    ///
    /// Returns the API error after restoring the list.
    pub async fn set_websearch(&self, id: Uuid, enabled: bool) -> Result<ConversationSettings, ApiError> {
        let patch = UpdateConversationRequest { websearch: Some(enabled), ..UpdateConversationRequest::default() };
        Ok(self.update(id, patch).await?.settings)
    }

    fn apply(&self, mutate: impl FnOnce(&mut Vec<ConversationSummary>)) -> Vec<ConversationSummary> {
        let mut snapshot = Vec::new();
        self.state.send_modify(|s| {
            snapshot = s.conversations.clone();
            mutate(&mut s.conversations);
        });
        snapshot
    }

    fn rollback(&self, snapshot: Vec<ConversationSummary>, action: &'static str, error: ApiError) -> ApiError {
        warn!(action, error = %error, "conversations: rolling back");
        self.state.send_modify(|s| {
            s.conversations = snapshot;
            s.notices.push(Notice::new(action, &error));
        });
        error
    }
}

/// A conversation shown locally but not yet stored by the server.
#[must_use = "the create is only sent by `confirm`"]
pub struct PendingCreate {
    id: Uuid,
    store: ConversationStore,
    request: CreateConversationRequest,
}

impl PendingCreate {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Send the create. On failure the placeholder is removed.
    ///
    /// # Errors
    ///
    /// Returns the API error after removing the placeholder.
    pub async fn confirm(self) -> Result<ConversationSummary, ApiError> {
        let id = self.id;
        match self.store.api.create_conversation(&self.request).await {
            Ok(created) => {
                let mut confirmed = ConversationSummary::placeholder(id, self.request.title.as_deref());
                self.store.state.send_modify(|s| {
                    if let Some(row) = s.conversations.iter_mut().find(|c| c.id == id) {
                        row.created_at = created.created_at;
                        row.updated_at = created.created_at;
                        confirmed = row.clone();
                    }
                });
                info!(%id, "conversations: created");
                Ok(confirmed)
            }
            Err(e) => {
                let remaining = self.store.conversations().into_iter().filter(|c| c.id != id).collect();
                Err(self.store.rollback(remaining, "create", e))
            }
        }
    }
}
