//! # lume-client
//!
//! Client-side state for Lume: the optimistic conversation list, the slides
//! outline editor and the chat session that assembles streamed replies,
//! plus the HTTP client they talk to the server through.
//!
//! UI layers render from these containers and call their named actions;
//! nothing here depends on a particular front end.

pub mod net;
pub mod state;
