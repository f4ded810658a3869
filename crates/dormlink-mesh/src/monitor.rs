//! Connectivity and peer monitor.
//!
//! Runs in a dedicated tokio task and owns the two externally observed
//! signals: internet reachability and the roster of visible mesh peers.
//! Raw signal transitions are republished as [`LinkUpdate`]s; the monitor
//! never infers a delivery mode itself. A transition into `online = true`,
//! or an increase in peer count versus the previous observed value, is
//! flagged as a sync trigger.

use chrono::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use dormlink_shared::constants::{CHANNEL_CAPACITY, PEER_STALE_SECS};
use dormlink_shared::types::PeerId;

use crate::peers::{MeshPeer, PeerRoster};

/// How often the monitor sweeps the roster for stale peers.
const PRUNE_INTERVAL_SECS: u64 = 60;

/// Raw boundary signals sent *into* the monitor task.
#[derive(Debug)]
pub enum LinkSignal {
    /// Global network reachability changed.
    ConnectivityChanged(bool),
    /// Discovery saw a peer (new or refreshed).
    PeerDiscovered(MeshPeer),
    /// A peer went out of range.
    PeerLost(PeerId),
    /// Request a snapshot of the current link state.
    GetSnapshot(oneshot::Sender<LinkSnapshot>),
    /// Gracefully shut down the monitor.
    Shutdown,
}

/// Link state republished *from* the monitor on every observed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkUpdate {
    pub online: bool,
    pub peer_count: usize,
    /// Whether this transition should wake the sync engine: set when we
    /// came online or the peer count increased.
    pub trigger: bool,
}

/// Snapshot of the monitor's current view.
#[derive(Debug, Clone)]
pub struct LinkSnapshot {
    pub online: bool,
    pub peers: Vec<MeshPeer>,
}

/// Spawn the monitor in a background tokio task.
///
/// Returns the signal sender and the update receiver. The task exits when
/// all signal senders are dropped or a [`LinkSignal::Shutdown`] arrives.
pub fn spawn_monitor(
    initial_online: bool,
) -> (mpsc::Sender<LinkSignal>, mpsc::Receiver<LinkUpdate>) {
    let (signal_tx, mut signal_rx) = mpsc::channel::<LinkSignal>(CHANNEL_CAPACITY);
    let (update_tx, update_rx) = mpsc::channel::<LinkUpdate>(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut roster = PeerRoster::new();
        let mut online = initial_online;

        let mut prune_interval =
            tokio::time::interval(std::time::Duration::from_secs(PRUNE_INTERVAL_SECS));
        // The first tick completes immediately; swallow it so the loop only
        // prunes on the steady cadence.
        prune_interval.tick().await;

        info!(online, "link monitor started");

        loop {
            tokio::select! {
                signal = signal_rx.recv() => {
                    let prev_online = online;
                    let prev_count = roster.peer_count();

                    match signal {
                        Some(LinkSignal::ConnectivityChanged(now_online)) => {
                            online = now_online;
                        }
                        Some(LinkSignal::PeerDiscovered(peer)) => {
                            roster.on_discovered(peer);
                        }
                        Some(LinkSignal::PeerLost(peer_id)) => {
                            roster.on_lost(&peer_id);
                        }
                        Some(LinkSignal::GetSnapshot(reply)) => {
                            let _ = reply.send(LinkSnapshot {
                                online,
                                peers: roster.all_peers(),
                            });
                            continue;
                        }
                        Some(LinkSignal::Shutdown) => {
                            info!("link monitor shutdown requested");
                            break;
                        }
                        None => {
                            info!("signal channel closed, stopping link monitor");
                            break;
                        }
                    }

                    let peer_count = roster.peer_count();
                    if online == prev_online && peer_count == prev_count {
                        continue;
                    }

                    let update = LinkUpdate {
                        online,
                        peer_count,
                        trigger: (online && !prev_online) || peer_count > prev_count,
                    };
                    debug!(
                        online = update.online,
                        peer_count = update.peer_count,
                        trigger = update.trigger,
                        "link state changed"
                    );
                    if update_tx.send(update).await.is_err() {
                        break;
                    }
                }

                _ = prune_interval.tick() => {
                    let prev_count = roster.peer_count();
                    roster.prune_stale(Duration::seconds(PEER_STALE_SECS as i64));
                    let peer_count = roster.peer_count();
                    if peer_count != prev_count {
                        let update = LinkUpdate {
                            online,
                            peer_count,
                            trigger: false,
                        };
                        if update_tx.send(update).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("link monitor terminated");
    });

    (signal_tx, update_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn coming_online_is_a_trigger() {
        let (tx, mut rx) = spawn_monitor(false);

        tx.send(LinkSignal::ConnectivityChanged(true)).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert!(update.online);
        assert!(update.trigger);
    }

    #[tokio::test(start_paused = true)]
    async fn going_offline_is_not_a_trigger() {
        let (tx, mut rx) = spawn_monitor(true);

        tx.send(LinkSignal::ConnectivityChanged(false)).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert!(!update.online);
        assert!(!update.trigger);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_increase_is_a_trigger_loss_is_not() {
        let (tx, mut rx) = spawn_monitor(false);

        let peer = MeshPeer::new("zee_vibes", 2);
        let id = peer.id;
        tx.send(LinkSignal::PeerDiscovered(peer)).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.peer_count, 1);
        assert!(update.trigger);

        tx.send(LinkSignal::PeerLost(id)).await.unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update.peer_count, 0);
        assert!(!update.trigger);
    }

    #[tokio::test(start_paused = true)]
    async fn redundant_signals_are_not_republished() {
        let (tx, mut rx) = spawn_monitor(true);

        // Same value again: no transition, nothing republished.
        tx.send(LinkSignal::ConnectivityChanged(true)).await.unwrap();
        // A real transition follows; the next update must be this one.
        tx.send(LinkSignal::ConnectivityChanged(false)).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert!(!update.online);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_roster() {
        let (tx, _rx) = spawn_monitor(true);

        tx.send(LinkSignal::PeerDiscovered(MeshPeer::new("if_tech", 10)))
            .await
            .unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(LinkSignal::GetSnapshot(reply_tx)).await.unwrap();

        let snapshot = reply_rx.await.unwrap();
        assert!(snapshot.online);
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.peers[0].handle, "if_tech");
    }
}
