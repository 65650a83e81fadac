mod config;
mod db;
mod error;
mod llm;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use crate::llm::LlmChat;
use crate::services::search::WebSearch;
use crate::services::store::ChatStore;

#[tokio::main]
async fn main() {
    // Missing .env is fine; the process environment still applies.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::ServerConfig::from_env();
    let port = config.port;

    let store: Arc<dyn ChatStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(services::pg_store::PgChatStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
            Arc::new(services::memory_store::MemoryChatStore::new())
        }
    };

    // Initialize LLM client (non-fatal: chat disabled if no provider key is set).
    let llm: Option<Arc<dyn LlmChat>> = if config.llm.any_provider() {
        match llm::LlmClient::from_config(&config.llm) {
            Ok(client) => {
                tracing::info!(default_model = %config.chat.default_model, "LLM client initialized");
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM client init failed; chat disabled");
                None
            }
        }
    } else {
        tracing::warn!("no LLM provider key set; chat disabled");
        None
    };

    let search: Option<Arc<dyn WebSearch>> =
        config
            .tavily_api_key
            .clone()
            .and_then(|key| match services::search::TavilyClient::new(key) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn WebSearch>),
                Err(e) => {
                    tracing::warn!(error = %e, "search client init failed; web tools disabled");
                    None
                }
            });

    let state = state::AppState::new(store, llm, search, config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "lume listening");
    axum::serve(listener, app).await.expect("server failed");
}
