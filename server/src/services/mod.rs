//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation and caller plumbing.
//! Storage is reached only through the `ChatStore` trait.

pub mod artifacts;
pub mod chat;
pub mod conversations;
pub mod history;
pub mod locks;
pub mod memory_store;
pub mod pg_store;
pub mod search;
pub mod store;
pub mod title;
pub mod tools;
