//! HTTP error body: every non-2xx response is JSON `{error, code}`.
//!
//! Service errors convert into `ApiError` with a fixed status mapping, so
//! handlers can use `?` and never build error responses by hand. Server
//! errors are logged here once.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::error::ErrorCode;
use crate::services::artifacts::ArtifactError;
use crate::services::chat::ChatError;
use crate::services::conversations::ConversationError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    #[must_use]
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    fn from_service<E: ErrorCode>(status: StatusCode, err: &E) -> Self {
        if status.is_server_error() {
            error!(code = err.error_code(), error = %err, "routes: request failed");
        }
        Self::new(status, err.error_code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message, "code": self.code }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("E_INVALID_BODY", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request("E_INVALID_PATH", rejection.body_text())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = match &err {
            ChatError::InvalidInput(_) | ChatError::ModelUnavailable { .. } => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Persistence(_) | ChatError::Llm(_) | ChatError::Timeout(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::from_service(status, &err)
    }
}

impl From<ConversationError> for ApiError {
    fn from(err: ConversationError) -> Self {
        let status = match &err {
            ConversationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ConversationError::NotFound(_) => StatusCode::NOT_FOUND,
            ConversationError::Conflict(_) => StatusCode::CONFLICT,
            ConversationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::from_service(status, &err)
    }
}

impl From<ArtifactError> for ApiError {
    fn from(err: ArtifactError) -> Self {
        let status = match &err {
            ArtifactError::NotFound(_) => StatusCode::NOT_FOUND,
            ArtifactError::InvalidContent(_) => StatusCode::BAD_REQUEST,
            ArtifactError::VersionConflict { .. } => StatusCode::CONFLICT,
            ArtifactError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::from_service(status, &err)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::services::store::StoreError;

    #[test]
    fn setup_errors_map_to_statuses() {
        let not_found: ApiError = ChatError::NotFound(Uuid::nil()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.code, "E_CONVERSATION_NOT_FOUND");

        let unavailable: ApiError = ChatError::ModelUnavailable { model: "gpt-4o".into(), provider: "openai" }.into();
        assert_eq!(unavailable.status, StatusCode::BAD_REQUEST);

        let persistence: ApiError = ChatError::Persistence(StoreError::Corrupt("x".into())).into();
        assert_eq!(persistence.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn version_conflict_is_409() {
        let err: ApiError = ArtifactError::VersionConflict { expected: "1".into(), actual: "2".into() }.into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "E_VERSION_CONFLICT");
    }

    #[tokio::test]
    async fn body_is_error_and_code() {
        let response = ApiError::bad_request("E_X", "nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "nope", "code": "E_X" }));
    }
}
