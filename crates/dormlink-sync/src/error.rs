use thiserror::Error;

use dormlink_shared::types::{ConversationId, MessageId};
use dormlink_store::StoreError;

/// Errors surfaced by the sync engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Outbox persistence failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A submitted message had an empty body.
    #[error("Message body is empty")]
    EmptyMessage,

    /// The referenced conversation does not exist.
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// The referenced message does not exist.
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),

    /// The engine task is no longer running.
    #[error("Sync engine stopped")]
    EngineGone,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
