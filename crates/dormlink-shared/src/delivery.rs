//! Delivery-mode inference.
//!
//! A pure mapping from the two externally observed signals (internet
//! reachability, count of visible mesh peers) to the transport a drain
//! cycle would use. Computed fresh on every evaluation, never stored.

use serde::{Deserialize, Serialize};

use crate::types::MessageStatus;

/// The transport available for delivering queued messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Internet reachable: deliver directly.
    Direct,
    /// Offline but at least one mesh peer visible: relay via the mesh.
    Relay,
    /// Offline with no peers: nothing can move.
    Offline,
}

impl DeliveryMode {
    /// Resolve the current mode from raw connectivity signals.
    ///
    /// Internet connectivity always wins over mesh relaying.
    pub fn resolve(online: bool, peer_count: usize) -> Self {
        if online {
            DeliveryMode::Direct
        } else if peer_count > 0 {
            DeliveryMode::Relay
        } else {
            DeliveryMode::Offline
        }
    }

    /// Whether a drain cycle may run under this mode.
    pub fn can_deliver(self) -> bool {
        !matches!(self, DeliveryMode::Offline)
    }

    /// Status assigned to a freshly submitted message under this mode.
    ///
    /// Only a direct send counts as delivered at creation time; anything
    /// else goes through the outbox first.
    pub fn initial_status(self) -> MessageStatus {
        match self {
            DeliveryMode::Direct => MessageStatus::Sent,
            DeliveryMode::Relay | DeliveryMode::Offline => MessageStatus::Pending,
        }
    }

    /// Terminal status applied to pending messages when a drain cycle
    /// settles under this mode. `None` means the cycle must not run.
    pub fn settled_status(self) -> Option<MessageStatus> {
        match self {
            DeliveryMode::Direct => Some(MessageStatus::Sent),
            DeliveryMode::Relay => Some(MessageStatus::MeshRelayed),
            DeliveryMode::Offline => None,
        }
    }

    /// Human-readable transport name used in sync status copy.
    pub fn via(self) -> &'static str {
        match self {
            DeliveryMode::Direct => "Internet",
            DeliveryMode::Relay => "Mesh",
            DeliveryMode::Offline => "None",
        }
    }
}
