//! REST and SSE client for the Lume server.
//!
//! The state containers depend on the `ConversationApi`, `ArtifactApi` and
//! `ChatApi` traits rather than on HTTP directly; `HttpApi` is the reqwest
//! implementation and tests substitute a scripted one.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses carry `{error, code}` and surface as
//! `ApiError::Status` with the server's code preserved, so callers can branch
//! on conflicts and not-found without string matching.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use lume_protocol::sse::{SseEvent, SseLineBuffer};
use lume_protocol::{
    Artifact, ChatTurnRequest, Conversation, ConversationDetail, ConversationSummary, CreateConversationRequest,
    CreateConversationResponse, DeleteAllResponse, ModelSummary, SaveArtifactRequest, StreamPart,
    UpdateConversationRequest,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} ({code}, HTTP {status})")]
    Status { status: u16, code: String, message: String },
    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}

impl ApiError {
    /// Server error code, or a local one for transport failures.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Status { code, .. } => code,
            Self::Http(_) => "E_HTTP",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidBaseUrl(_) | Self::InvalidUserId(_) => "E_CONFIG",
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status: 409, .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Stream parts of one chat turn, ending after the terminal part.
pub type PartStream = BoxStream<'static, Result<StreamPart, ApiError>>;

// =============================================================================
// TRAITS
// =============================================================================

#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError>;

    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CreateConversationResponse, ApiError>;

    async fn get_conversation(&self, id: Uuid) -> Result<ConversationDetail, ApiError>;

    async fn update_conversation(
        &self,
        id: Uuid,
        request: &UpdateConversationRequest,
    ) -> Result<Conversation, ApiError>;

    async fn delete_conversation(&self, id: Uuid) -> Result<(), ApiError>;

    /// Returns the number of conversations removed.
    async fn delete_all_conversations(&self) -> Result<u64, ApiError>;
}

#[async_trait]
pub trait ArtifactApi: Send + Sync {
    async fn get_artifact(&self, id: Uuid) -> Result<Artifact, ApiError>;

    async fn save_artifact(&self, id: Uuid, request: &SaveArtifactRequest) -> Result<Artifact, ApiError>;
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Start a turn. Setup failures come back as `Err`; failures after the
    /// stream opens arrive in-band as `error` parts.
    async fn send_chat(&self, request: &ChatTurnRequest) -> Result<PartStream, ApiError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<Uuid>,
}

impl HttpApi {
    /// # Errors
    ///
    /// Returns an error if the base URL is not http(s) or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, user_id: Option<Uuid>) -> Result<Self, ApiError> {
        let base = base_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ApiError::InvalidBaseUrl(base_url.to_owned()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url: base.to_owned(), user_id })
    }

    /// Build from `LUME_BASE_URL` and `LUME_USER_ID`.
    ///
    /// # Errors
    ///
    /// Returns an error if either variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var("LUME_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let user_id = match std::env::var("LUME_USER_ID") {
            Ok(raw) => Some(Uuid::parse_str(raw.trim()).map_err(|_| ApiError::InvalidUserId(raw))?),
            Err(_) => None,
        };
        Self::new(&base_url, user_id)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match self.user_id {
            Some(id) => builder.header(USER_ID_HEADER, id.to_string()),
            None => builder,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the server is unreachable or unhealthy.
    pub async fn health(&self) -> Result<(), ApiError> {
        check(self.request(Method::GET, "/healthz").send().await?).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_models(&self) -> Result<Vec<ModelSummary>, ApiError> {
        send_json(self.request(Method::GET, "/api/models")).await
    }
}

#[async_trait]
impl ConversationApi for HttpApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        send_json(self.request(Method::GET, "/api/conversations")).await
    }

    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CreateConversationResponse, ApiError> {
        send_json(self.request(Method::POST, "/api/conversations").json(request))
            .await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<ConversationDetail, ApiError> {
        send_json(self.request(Method::GET, &format!("/api/conversations/{id}")))
            .await
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        request: &UpdateConversationRequest,
    ) -> Result<Conversation, ApiError> {
        send_json(
            self.request(Method::PATCH, &format!("/api/conversations/{id}"))
                .json(request),
        )
        .await
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("/api/conversations/{id}"))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_all_conversations(&self) -> Result<u64, ApiError> {
        let body: DeleteAllResponse = send_json(self.request(Method::DELETE, "/api/conversations")).await?;
        Ok(body.deleted)
    }
}

#[async_trait]
impl ArtifactApi for HttpApi {
    async fn get_artifact(&self, id: Uuid) -> Result<Artifact, ApiError> {
        send_json(self.request(Method::GET, &format!("/api/artifacts/{id}")))
            .await
    }

    async fn save_artifact(&self, id: Uuid, request: &SaveArtifactRequest) -> Result<Artifact, ApiError> {
        send_json(
            self.request(Method::PATCH, &format!("/api/artifacts/{id}"))
                .json(request),
        )
        .await
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn send_chat(&self, request: &ChatTurnRequest) -> Result<PartStream, ApiError> {
        let response = self
            .request(Method::POST, "/api/chat")
            .json(request)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(decode_parts(response.bytes_stream().map(|chunk| chunk.map_err(ApiError::from))))
    }
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
    let response = check(builder.send().await?).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

fn status_error(status: u16, body: &[u8]) -> ApiError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
        code: String,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => ApiError::Status { status, code: parsed.code, message: parsed.error },
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_owned();
            let message = if text.is_empty() { format!("HTTP {status}") } else { text };
            ApiError::Status { status, code: "E_HTTP_STATUS".to_owned(), message }
        }
    }
}

// =============================================================================
// SSE DECODING
// =============================================================================

struct Decoder {
    bytes: BoxStream<'static, Result<Bytes, ApiError>>,
    lines: SseLineBuffer,
    ready: VecDeque<Result<StreamPart, ApiError>>,
    done: bool,
}

impl Decoder {
    fn queue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.done {
                return;
            }
            match event {
                SseEvent::Data(data) => self
                    .ready
                    .push_back(serde_json::from_str(&data).map_err(ApiError::from)),
                SseEvent::Done => self.done = true,
            }
        }
    }
}

/// Turn the chat response body into stream parts, stopping at `[DONE]`.
pub fn decode_parts<S>(bytes: S) -> PartStream
where
    S: Stream<Item = Result<Bytes, ApiError>> + Send + 'static,
{
    let decoder = Decoder { bytes: bytes.boxed(), lines: SseLineBuffer::new(), ready: VecDeque::new(), done: false };
    stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(item) = decoder.ready.pop_front() {
                return Some((item, decoder));
            }
            if decoder.done {
                return None;
            }
            match decoder.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = decoder.lines.feed(&chunk);
                    decoder.queue(events);
                }
                Some(Err(e)) => {
                    decoder.done = true;
                    return Some((Err(e), decoder));
                }
                None => {
                    let events = decoder.lines.flush();
                    decoder.queue(events);
                    decoder.done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
