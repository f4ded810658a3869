use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token used in persisted records for messages authored on this device.
pub const LOCAL_SENDER: &str = "me";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier. UUIDv7, so ids sort by creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerId(pub Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message: this device, or a peer identified by handle.
///
/// Serialized as a bare string (`"me"` or the peer handle) so the persisted
/// layout stays a flat text field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum SenderId {
    Me,
    Peer(String),
}

impl SenderId {
    pub fn is_me(&self) -> bool {
        matches!(self, SenderId::Me)
    }

    pub fn as_str(&self) -> &str {
        match self {
            SenderId::Me => LOCAL_SENDER,
            SenderId::Peer(handle) => handle,
        }
    }
}

impl From<String> for SenderId {
    fn from(s: String) -> Self {
        if s == LOCAL_SENDER {
            SenderId::Me
        } else {
            SenderId::Peer(s)
        }
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<SenderId> for String {
    fn from(sender: SenderId) -> Self {
        sender.as_str().to_string()
    }
}

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of an outgoing message.
///
/// `Pending` means the message currently sits in the durable outbox; the
/// other three are terminal for the current delivery cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Pending,
    MeshRelayed,
    Failed,
}

impl MessageStatus {
    /// Stable text form used in the persisted layout.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Pending => "pending",
            MessageStatus::MeshRelayed => "mesh_relayed",
            MessageStatus::Failed => "failed",
        }
    }

    /// Badge copy shown next to an outgoing message bubble.
    pub fn badge(self) -> &'static str {
        match self {
            MessageStatus::Sent => "SENT",
            MessageStatus::Pending => "QUEUED",
            MessageStatus::MeshRelayed => "RELAYED",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, MessageStatus::Pending)
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "pending" => Ok(MessageStatus::Pending),
            "mesh_relayed" => Ok(MessageStatus::MeshRelayed),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown message status: {0}")]
pub struct ParseStatusError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_round_trip() {
        let me = SenderId::from("me");
        assert!(me.is_me());
        assert_eq!(String::from(me), "me");

        let peer = SenderId::from("zee_vibes");
        assert!(!peer.is_me());
        assert_eq!(peer.as_str(), "zee_vibes");
    }

    #[test]
    fn status_text_round_trip() {
        for status in [
            MessageStatus::Sent,
            MessageStatus::Pending,
            MessageStatus::MeshRelayed,
            MessageStatus::Failed,
        ] {
            let parsed: MessageStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("delivered".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn message_ids_are_unique_and_time_ordered() {
        let a = MessageId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = MessageId::new();
        assert_ne!(a, b);
        assert!(a < b, "v7 ids from later ticks must sort after earlier ones");
    }
}
