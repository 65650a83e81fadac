//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the conversation store, the optional LLM gateway and search
//! backend, the loaded configuration, and the per-conversation turn locks.
//! Every field is behind an `Arc` (or is itself a cheap handle), so cloning
//! the state per request is free.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::llm::LlmChat;
use crate::services::locks::ConversationLocks;
use crate::services::search::WebSearch;
use crate::services::store::ChatStore;

/// Shared application state, injected into Axum handlers via State extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    /// Optional LLM gateway. `None` if no provider key is configured.
    pub llm: Option<Arc<dyn LlmChat>>,
    /// Optional web search backend. Enables the web tools when present.
    pub search: Option<Arc<dyn WebSearch>>,
    pub config: Arc<ServerConfig>,
    pub locks: ConversationLocks,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        llm: Option<Arc<dyn LlmChat>>,
        search: Option<Arc<dyn WebSearch>>,
        config: ServerConfig,
    ) -> Self {
        Self { store, llm, search, config: Arc::new(config), locks: ConversationLocks::new() }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
