//! Artifact service: read and save versioned documents.
//!
//! DESIGN
//! ======
//! Saves replace the whole content. Content is validated against the
//! artifact's kind and normalized (slides renumbered, `slidesCount`
//! recomputed) before it is written, so the stored document always holds
//! the outline invariants no matter what the client sent. The version is a
//! decimal counter bumped by the store on every save; an `expectedVersion`
//! turns the save into a compare-and-swap, and without it the last save
//! wins.

use lume_protocol::artifact::validate_content;
use lume_protocol::{Artifact, ArtifactContentError, SaveArtifactRequest};
use tracing::info;
use uuid::Uuid;

use super::store::{ChatStore, StoreError};
use crate::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    InvalidContent(#[from] ArtifactContentError),
    #[error("version conflict: expected {expected}, current is {actual}")]
    VersionConflict { expected: String, actual: String },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ArtifactError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ArtifactNotFound(id) => Self::NotFound(id),
            StoreError::VersionConflict { expected, actual } => Self::VersionConflict { expected, actual },
            other => Self::Store(other),
        }
    }
}

impl ErrorCode for ArtifactError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_ARTIFACT_NOT_FOUND",
            Self::InvalidContent(_) => "E_INVALID_CONTENT",
            Self::VersionConflict { .. } => "E_VERSION_CONFLICT",
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.retryable())
    }
}

/// # Errors
///
/// `NotFound` if absent or its conversation belongs to someone else.
pub async fn get(store: &dyn ChatStore, id: Uuid, owner: Option<Uuid>) -> Result<Artifact, ArtifactError> {
    Ok(store.get_artifact(id, owner).await?)
}

/// Validate, normalize and save new content; returns the stored artifact.
///
/// # Errors
///
/// `NotFound`, `InvalidContent` when the content does not fit the kind, or
/// `VersionConflict` when `expected_version` is stale.
pub async fn save(
    store: &dyn ChatStore,
    id: Uuid,
    owner: Option<Uuid>,
    request: SaveArtifactRequest,
) -> Result<Artifact, ArtifactError> {
    let current = store.get_artifact(id, owner).await?;
    let content = validate_content(current.kind, &request.content)?;
    let saved = store
        .save_artifact(id, owner, content, request.expected_version.as_deref())
        .await?;
    info!(artifact_id = %id, version = %saved.version, "artifacts: saved");
    Ok(saved)
}
