//! Shared client-side state modules.
//!
//! DESIGN
//! ======
//! State is split by domain (`conversations`, `outline_editor`, `chat`) so
//! each view can depend on one focused container. Containers reach the
//! server only through the `net::api` traits.

pub mod chat;
pub mod conversations;
pub mod outline_editor;
