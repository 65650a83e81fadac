//! Conversation routes.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use lume_protocol::{
    Conversation, ConversationDetail, ConversationSummary, CreateConversationRequest, CreateConversationResponse,
    DeleteAllResponse, UpdateConversationRequest,
};
use uuid::Uuid;

use super::caller::Caller;
use super::error::ApiError;
use crate::services::conversations;
use crate::state::AppState;

/// `GET /api/conversations`: caller's conversations, most recent activity first.
pub async fn list(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(conversations::list(state.store.as_ref(), caller).await?))
}

/// `POST /api/conversations`: create, optionally with a client-minted id.
pub async fn create(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateConversationResponse>), ApiError> {
    let Json(request) = payload?;
    let created = conversations::create(state.store.as_ref(), caller, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `DELETE /api/conversations`: delete everything the caller owns.
pub async fn delete_all(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<DeleteAllResponse>, ApiError> {
    let deleted = conversations::delete_all(state.store.as_ref(), caller).await?;
    Ok(Json(DeleteAllResponse { deleted }))
}

/// `GET /api/conversations/{id}`: conversation plus ordered messages.
pub async fn get(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let Path(id) = id?;
    Ok(Json(conversations::get(state.store.as_ref(), id, caller).await?))
}

/// `PATCH /api/conversations/{id}`: title, model and settings.
pub async fn update(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateConversationRequest>, JsonRejection>,
) -> Result<Json<Conversation>, ApiError> {
    let Path(id) = id?;
    let Json(request) = payload?;
    Ok(Json(conversations::update(state.store.as_ref(), id, caller, request).await?))
}

/// `DELETE /api/conversations/{id}`.
pub async fn delete(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    conversations::delete(state.store.as_ref(), id, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "conversations_test.rs"]
mod tests;
