//! Caller identity.
//!
//! Authentication happens upstream; whatever sits in front of this service
//! forwards the user id in `x-user-id`. No header means an anonymous
//! caller, which sees only anonymous conversations.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Optional owner id of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Option<Uuid>);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(Self(None));
        };
        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(|id| Self(Some(id)))
            .ok_or_else(|| ApiError::bad_request("E_INVALID_CALLER", format!("{USER_ID_HEADER} must be a UUID")))
    }
}
