//! Mesh peer tracking.
//!
//! Maintains an in-memory map of currently discoverable peers, their
//! handles, approximate distance, and when they were last seen.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use dormlink_shared::types::PeerId;

/// A nearby student node visible over the simulated mesh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeshPeer {
    /// The peer's mesh identifier.
    pub id: PeerId,
    /// The peer's chosen handle.
    pub handle: String,
    /// Approximate distance in meters, as reported by discovery.
    pub distance_m: u32,
    /// When the peer was last seen by discovery.
    pub last_seen: DateTime<Utc>,
}

impl MeshPeer {
    pub fn new(handle: impl Into<String>, distance_m: u32) -> Self {
        Self {
            id: PeerId::new(),
            handle: handle.into(),
            distance_m,
            last_seen: Utc::now(),
        }
    }
}

/// Tracks all currently visible mesh peers.
#[derive(Debug, Clone, Default)]
pub struct PeerRoster {
    peers: HashMap<PeerId, MeshPeer>,
}

impl PeerRoster {
    /// Create a new, empty roster.
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Record a discovered peer. Re-discovering a known peer refreshes its
    /// record (distance and last-seen time).
    pub fn on_discovered(&mut self, peer: MeshPeer) {
        debug!(
            peer = %peer.id,
            handle = %peer.handle,
            distance_m = peer.distance_m,
            "tracking mesh peer"
        );
        self.peers.insert(peer.id, peer);
    }

    /// Remove a peer that went out of range.
    pub fn on_lost(&mut self, peer_id: &PeerId) {
        if self.peers.remove(peer_id).is_some() {
            debug!(peer = %peer_id, "removed mesh peer");
        }
    }

    /// Drop every peer not seen within `ttl`. Returns how many were removed.
    pub fn prune_stale(&mut self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let before = self.peers.len();
        self.peers.retain(|_, peer| peer.last_seen >= cutoff);
        let removed = before - self.peers.len();
        if removed > 0 {
            debug!(removed, "pruned stale mesh peers");
        }
        removed
    }

    /// Get a specific peer.
    pub fn get(&self, peer_id: &PeerId) -> Option<&MeshPeer> {
        self.peers.get(peer_id)
    }

    /// Check whether a peer is currently visible.
    pub fn is_visible(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Number of visible peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Return all visible peers (snapshot).
    pub fn all_peers(&self) -> Vec<MeshPeer> {
        self.peers.values().cloned().collect()
    }
}
