//! Shared wire and domain model for Lume.
//!
//! This crate owns the representations used by both `lume-server` and
//! `lume-client`: message parts as persisted and replayed, the stream parts
//! relayed over SSE during a chat turn, conversation DTOs, the slides outline
//! artifact schema, and the lenient JSON parser used to render tool input
//! while it is still streaming.

pub mod artifact;
pub mod conversation;
pub mod message;
pub mod partial_json;
pub mod sse;
pub mod stream;

pub use artifact::{
    Artifact, ArtifactContentError, ArtifactKind, Chapter, MarkdownDocument, OutlineHeader, PartialSlidesOutline,
    SaveArtifactRequest, Slide, SlidesOutline,
};
pub use conversation::{
    ChatTurnRequest, Conversation, ConversationDetail, ConversationSettings, ConversationSummary,
    CreateConversationRequest, CreateConversationResponse, DeleteAllResponse, ModelSummary, SettingsPatch,
    UpdateConversationRequest,
};
pub use message::{MessagePart, Role, ToolState, UiMessage};
pub use partial_json::{ParseOutcome, PartialJson};
pub use stream::{MessageAssembler, StreamPart};
