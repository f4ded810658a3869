//! Typed convenience wrapper around the engine command channel.
//!
//! The embedding application (or a test) talks to the engine through this
//! handle instead of constructing [`EngineCommand`] values by hand.

use tokio::sync::{mpsc, oneshot};

use dormlink_shared::types::{ConversationId, MessageId};

use crate::conversations::Conversation;
use crate::engine::EngineCommand;
use crate::error::{EngineError, Result};

/// Cloneable handle to a running sync engine.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl SyncHandle {
    pub fn new(cmd_tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Submit a message authored on this device. Returns the new message id.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: impl Into<String>,
    ) -> Result<MessageId> {
        let (reply, rx) = oneshot::channel();
        self.command(EngineCommand::Send {
            conversation_id,
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::EngineGone)?
    }

    /// Deliver a message received from a peer.
    pub async fn receive_message(
        &self,
        conversation_id: ConversationId,
        handle: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<()> {
        self.command(EngineCommand::Receive {
            conversation_id,
            handle: handle.into(),
            text: text.into(),
        })
        .await
    }

    /// Re-attempt delivery of a failed message.
    pub async fn retry_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<()> {
        self.command(EngineCommand::Retry {
            conversation_id,
            message_id,
        })
        .await
    }

    /// Report a delivered message as failed.
    pub async fn mark_failed(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<()> {
        self.command(EngineCommand::MarkFailed {
            conversation_id,
            message_id,
        })
        .await
    }

    /// Reset a conversation's unread counter.
    pub async fn mark_read(&self, conversation_id: ConversationId) -> Result<()> {
        self.command(EngineCommand::MarkRead { conversation_id })
            .await
    }

    /// Snapshot of the current conversation list.
    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        let (reply, rx) = oneshot::channel();
        self.command(EngineCommand::GetConversations(reply)).await?;
        rx.await.map_err(|_| EngineError::EngineGone)
    }

    /// Number of entries currently queued in the durable outbox.
    pub async fn outbox_depth(&self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.command(EngineCommand::GetOutboxDepth(reply)).await?;
        rx.await.map_err(|_| EngineError::EngineGone)?
    }

    /// Ask the engine to shut down.
    pub async fn shutdown(&self) -> Result<()> {
        self.command(EngineCommand::Shutdown).await
    }

    async fn command(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::EngineGone)
    }
}
