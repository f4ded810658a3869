//! # dormlink-sync
//!
//! The store-and-forward heart of Dormlink: an event-driven sync engine that
//! drains the durable outbox through whichever transport the current link
//! state allows, plus the in-memory conversation projection it feeds.
//!
//! The engine runs in a dedicated tokio task. External code talks to it
//! through typed command and event channels (or the [`SyncHandle`]
//! convenience wrapper); the connectivity monitor from `dormlink-mesh` is
//! bridged in with [`engine::bridge_link_updates`].

pub mod config;
pub mod conversations;
pub mod engine;
pub mod handle;

mod error;

pub use config::EngineConfig;
pub use conversations::{Conversation, ConversationList, Participant};
pub use engine::{bridge_link_updates, spawn_engine, EngineCommand, EngineEvent};
pub use error::EngineError;
pub use handle::SyncHandle;
