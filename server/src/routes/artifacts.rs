//! Artifact routes.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Json;
use lume_protocol::{Artifact, SaveArtifactRequest};
use uuid::Uuid;

use super::caller::Caller;
use super::error::ApiError;
use crate::services::artifacts;
use crate::state::AppState;

/// `GET /api/artifacts/{id}`.
pub async fn get(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Artifact>, ApiError> {
    let Path(id) = id?;
    Ok(Json(artifacts::get(state.store.as_ref(), id, caller).await?))
}

/// `PATCH /api/artifacts/{id}`: save whole content; `409` on a stale
/// `expectedVersion`.
pub async fn save(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SaveArtifactRequest>, JsonRejection>,
) -> Result<Json<Artifact>, ApiError> {
    let Path(id) = id?;
    let Json(request) = payload?;
    Ok(Json(artifacts::save(state.store.as_ref(), id, caller, request).await?))
}
