//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! JSON API under `/api` plus a liveness probe. Handlers translate between
//! HTTP and the service layer; every error body is `{error, code}`.

pub mod artifacts;
pub mod caller;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod models;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat::chat))
        .route(
            "/api/conversations",
            get(conversations::list)
                .post(conversations::create)
                .delete(conversations::delete_all),
        )
        .route(
            "/api/conversations/{id}",
            get(conversations::get)
                .patch(conversations::update)
                .delete(conversations::delete),
        )
        .route("/api/artifacts/{id}", get(artifacts::get).patch(artifacts::save))
        .route("/api/models", get(models::list))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::llm::registry::Provider;
    use crate::state::test_helpers::{self, MockLlm};

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = app(test_helpers::test_app_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn models_report_availability() {
        let llm = Arc::new(MockLlm::new(vec![]).without_provider(Provider::Google));
        let app = app(test_helpers::test_app_state_with_llm(llm));
        let response = app
            .oneshot(Request::builder().uri("/api/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let models: Vec<lume_protocol::ModelSummary> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(models.len(), crate::llm::registry::MODELS.len());
        assert!(models.iter().filter(|m| m.provider == "google").all(|m| !m.available));
        assert!(models.iter().filter(|m| m.provider == "anthropic").all(|m| m.available));
    }

    #[tokio::test]
    async fn models_unavailable_without_llm() {
        let app = app(test_helpers::test_app_state());
        let response = app
            .oneshot(Request::builder().uri("/api/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let models: Vec<lume_protocol::ModelSummary> = serde_json::from_slice(&bytes).unwrap();
        assert!(models.iter().all(|m| !m.available));
    }
}
