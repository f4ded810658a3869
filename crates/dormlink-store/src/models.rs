//! Domain model structs persisted in the local outbox database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dormlink_shared::{ConversationId, DeliveryMode, MessageId, MessageStatus, SenderId};

/// A single chat message.
///
/// The owning conversation is carried by the surrounding [`OutboxEntry`] or
/// conversation record rather than duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique, creation-time-ordered identifier.
    pub id: MessageId,
    /// Who authored the message.
    pub sender: SenderId,
    /// Message body. Never empty.
    pub text: String,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// Current delivery status.
    pub status: MessageStatus,
}

impl Message {
    /// Build a message authored on this device, with the status the given
    /// delivery mode assigns at creation time.
    pub fn outgoing(text: impl Into<String>, mode: DeliveryMode) -> Self {
        Self {
            id: MessageId::new(),
            sender: SenderId::Me,
            text: text.into(),
            created_at: Utc::now(),
            status: mode.initial_status(),
        }
    }

    /// Build a message received from a peer. Peer messages arrive already
    /// delivered.
    pub fn incoming(handle: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: SenderId::Peer(handle.into()),
            text: text.into(),
            created_at: Utc::now(),
            status: MessageStatus::Sent,
        }
    }

    /// Short clock-face form of the creation time, for message bubbles.
    pub fn display_time(&self) -> String {
        self.created_at.format("%I:%M %p").to_string()
    }
}

/// One queued row in the durable outbox.
///
/// Exclusively owned by the store until a drain cycle settles; the sync
/// engine is the only writer during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboxEntry {
    /// The conversation the queued message belongs to.
    pub conversation_id: ConversationId,
    /// Full copy of the queued message.
    pub message: Message,
}

impl OutboxEntry {
    pub fn new(conversation_id: ConversationId, message: Message) -> Self {
        Self {
            conversation_id,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_as_snake_case() {
        let message = Message::outgoing("offline draft", DeliveryMode::Relay);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["sender"], "me");

        let relayed = Message {
            status: MessageStatus::MeshRelayed,
            ..message
        };
        let json = serde_json::to_value(&relayed).unwrap();
        assert_eq!(json["status"], "mesh_relayed");
    }

    #[test]
    fn incoming_messages_arrive_delivered() {
        let message = Message::incoming("zee_vibes", "yo");
        assert_eq!(message.status, MessageStatus::Sent);
        assert!(!message.sender.is_me());
    }

    #[test]
    fn outgoing_status_tracks_delivery_mode() {
        assert_eq!(
            Message::outgoing("a", DeliveryMode::Direct).status,
            MessageStatus::Sent
        );
        assert_eq!(
            Message::outgoing("b", DeliveryMode::Offline).status,
            MessageStatus::Pending
        );
    }
}
