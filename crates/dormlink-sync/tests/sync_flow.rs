//! End-to-end tests for the outbox / sync-engine / projection stack.
//!
//! All timers run on tokio's paused test clock, so simulated round trips
//! and toast expiries advance deterministically.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;

use dormlink_mesh::monitor::{spawn_monitor, LinkSignal};
use dormlink_mesh::{LinkUpdate, MeshPeer};
use dormlink_shared::types::{ConversationId, MessageStatus};
use dormlink_shared::DeliveryMode;
use dormlink_store::Database;
use dormlink_sync::engine::{bridge_link_updates, spawn_engine, EngineCommand, EngineEvent};
use dormlink_sync::{Conversation, ConversationList, EngineConfig, Participant, SyncHandle};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

struct Rig {
    handle: SyncHandle,
    cmd_tx: mpsc::Sender<EngineCommand>,
    events: mpsc::Receiver<EngineEvent>,
    conversation_id: ConversationId,
}

/// Spawn an engine over a fresh database at `path`, with one seeded
/// conversation and the given starting link state.
fn spawn_rig(path: &Path, initial_online: bool) -> Rig {
    init_tracing();

    let db = Database::open_at(path).expect("open test db");

    let mut conversations = ConversationList::new();
    let conversation = Conversation::new(Participant::new("Zainab", "zee_vibes"));
    let conversation_id = conversation.id;
    conversations.insert(conversation);

    let config = EngineConfig {
        initial_online,
        ..EngineConfig::default()
    };
    let (cmd_tx, events) = spawn_engine(db, conversations, config);

    Rig {
        handle: SyncHandle::new(cmd_tx.clone()),
        cmd_tx,
        events,
        conversation_id,
    }
}

async fn recv_event(events: &mut mpsc::Receiver<EngineEvent>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("engine stopped")
}

/// Drain every event the engine has emitted so far. The preceding await on
/// a snapshot reply guarantees earlier commands were fully processed.
fn drain_ready_events(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

async fn link(rig: &Rig, online: bool, peer_count: usize, trigger: bool) {
    rig.cmd_tx
        .send(EngineCommand::Link(LinkUpdate {
            online,
            peer_count,
            trigger,
        }))
        .await
        .unwrap();
}

fn status_of(conversations: &[Conversation], id: ConversationId, index: usize) -> MessageStatus {
    conversations
        .iter()
        .find(|c| c.id == id)
        .unwrap()
        .messages[index]
        .status
}

#[tokio::test(start_paused = true)]
async fn online_send_skips_the_outbox() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), true);

    let id = rig
        .handle
        .send_message(rig.conversation_id, "lunch at the cafeteria?")
        .await
        .unwrap();

    match recv_event(&mut rig.events).await {
        EngineEvent::MessageAppended { message, .. } => {
            assert_eq!(message.id, id);
            assert_eq!(message.status, MessageStatus::Sent);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);

    let conversations = rig.handle.conversations().await.unwrap();
    let conversation = &conversations[0];
    assert_eq!(conversation.last_message, "lunch at the cafeteria?");
    assert_eq!(
        conversation.last_message,
        conversation.messages.last().unwrap().text
    );
}

#[tokio::test(start_paused = true)]
async fn offline_send_queues_then_drains_when_back_online() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), false);

    let id = rig
        .handle
        .send_message(rig.conversation_id, "see you at the lab")
        .await
        .unwrap();

    match recv_event(&mut rig.events).await {
        EngineEvent::MessageAppended { message, .. } => {
            assert_eq!(message.status, MessageStatus::Pending);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 1);

    link(&rig, true, 0, true).await;

    match recv_event(&mut rig.events).await {
        EngineEvent::SyncStarted { mode } => assert_eq!(mode, DeliveryMode::Direct),
        other => panic!("unexpected event: {other:?}"),
    }
    match recv_event(&mut rig.events).await {
        EngineEvent::SyncStatus { text } => {
            assert_eq!(text.as_deref(), Some("Syncing via Internet..."))
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match recv_event(&mut rig.events).await {
        EngineEvent::SyncSettled { mode, delivered } => {
            assert_eq!(mode, DeliveryMode::Direct);
            assert_eq!(delivered, vec![id]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match recv_event(&mut rig.events).await {
        EngineEvent::SyncStatus { text } => {
            assert_eq!(text.as_deref(), Some("Success! All messages synchronized."))
        }
        other => panic!("unexpected event: {other:?}"),
    }
    // The success toast expires on its own.
    match recv_event(&mut rig.events).await {
        EngineEvent::SyncStatus { text } => assert!(text.is_none()),
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);
    let conversations = rig.handle.conversations().await.unwrap();
    assert_eq!(
        status_of(&conversations, rig.conversation_id, 0),
        MessageStatus::Sent
    );
}

#[tokio::test(start_paused = true)]
async fn offline_send_with_peers_relays_via_mesh() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), false);

    // A peer is already in range; its discovery trigger found an empty
    // queue and did nothing.
    link(&rig, false, 1, true).await;

    rig.handle
        .send_message(rig.conversation_id, "psst, pass it along")
        .await
        .unwrap();

    // The send schedules a kick; the drain then settles over the mesh.
    let mut saw_relay_settle = false;
    for _ in 0..8 {
        match recv_event(&mut rig.events).await {
            EngineEvent::SyncSettled { mode, .. } => {
                assert_eq!(mode, DeliveryMode::Relay);
                saw_relay_settle = true;
                break;
            }
            _ => continue,
        }
    }
    assert!(saw_relay_settle, "expected a mesh relay drain cycle");

    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);
    let conversations = rig.handle.conversations().await.unwrap();
    assert_eq!(
        status_of(&conversations, rig.conversation_id, 0),
        MessageStatus::MeshRelayed
    );
}

#[tokio::test(start_paused = true)]
async fn rapid_triggers_coalesce_into_one_drain() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), false);

    rig.handle
        .send_message(rig.conversation_id, "only once, please")
        .await
        .unwrap();

    // Two triggers land back to back; the second is processed after the
    // cycle settles and finds nothing left to drain.
    link(&rig, true, 0, true).await;
    link(&rig, true, 1, true).await;

    // Barrier: the snapshot reply proves both triggers were processed.
    let _ = rig.handle.conversations().await.unwrap();

    let starts = drain_ready_events(&mut rig.events)
        .iter()
        .filter(|e| matches!(e, EngineEvent::SyncStarted { .. }))
        .count();
    assert_eq!(starts, 1, "second trigger must be coalesced");

    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn draining_an_empty_outbox_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), true);

    link(&rig, true, 0, true).await;
    let _ = rig.handle.conversations().await.unwrap();

    let events = drain_ready_events(&mut rig.events);
    assert!(
        events.is_empty(),
        "empty drain must emit nothing, got {events:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn queued_messages_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dorm.db");

    // First session: queue a message offline, then stop.
    let conversation_id;
    {
        let mut rig = spawn_rig(&path, false);
        conversation_id = rig.conversation_id;
        rig.handle
            .send_message(conversation_id, "power cut incoming")
            .await
            .unwrap();
        let _ = recv_event(&mut rig.events).await;

        rig.handle.shutdown().await.unwrap();
        rig.cmd_tx.closed().await;
    }

    // Second session: the in-memory list starts from scratch; the queued
    // message must be rehydrated before anything else happens.
    let db = Database::open_at(&path).unwrap();
    let (cmd_tx, mut events) =
        spawn_engine(db, ConversationList::new(), EngineConfig::default());
    let handle = SyncHandle::new(cmd_tx.clone());

    match recv_event(&mut events).await {
        EngineEvent::OutboxRestored { count } => assert_eq!(count, 1),
        other => panic!("unexpected event: {other:?}"),
    }

    let conversations = handle.conversations().await.unwrap();
    let restored = conversations
        .iter()
        .find(|c| c.id == conversation_id)
        .expect("conversation recreated from queue");
    assert_eq!(restored.messages.len(), 1);
    assert_eq!(restored.messages[0].status, MessageStatus::Pending);
    assert_eq!(restored.last_message, "power cut incoming");

    // Coming online delivers the survivor and empties the queue.
    cmd_tx
        .send(EngineCommand::Link(LinkUpdate {
            online: true,
            peer_count: 0,
            trigger: true,
        }))
        .await
        .unwrap();

    let mut settled = false;
    for _ in 0..8 {
        if let EngineEvent::SyncSettled { delivered, .. } = recv_event(&mut events).await {
            assert_eq!(delivered.len(), 1);
            settled = true;
            break;
        }
    }
    assert!(settled);
    assert_eq!(handle.outbox_depth().await.unwrap(), 0);

    let conversations = handle.conversations().await.unwrap();
    assert_eq!(
        conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .unwrap()
            .messages[0]
            .status,
        MessageStatus::Sent
    );
}

#[tokio::test(start_paused = true)]
async fn every_submitted_message_appears_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), false);

    let first = rig
        .handle
        .send_message(rig.conversation_id, "first")
        .await
        .unwrap();
    link(&rig, true, 0, true).await;
    let second = rig
        .handle
        .send_message(rig.conversation_id, "second")
        .await
        .unwrap();
    link(&rig, false, 0, false).await;
    let third = rig
        .handle
        .send_message(rig.conversation_id, "third")
        .await
        .unwrap();
    link(&rig, true, 0, true).await;

    let conversations = rig.handle.conversations().await.unwrap();
    let conversation = conversations
        .iter()
        .find(|c| c.id == rig.conversation_id)
        .unwrap();

    for id in [first, second, third] {
        assert_eq!(
            conversation.messages.iter().filter(|m| m.id == id).count(),
            1,
            "message {id} must appear exactly once"
        );
    }
    assert!(conversation.messages.iter().all(|m| !m.status.is_pending()));
    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn storage_fault_aborts_the_cycle_and_keeps_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dorm.db");
    let mut rig = spawn_rig(&path, false);

    rig.handle
        .send_message(rig.conversation_id, "hold on to this")
        .await
        .unwrap();
    let _ = recv_event(&mut rig.events).await;

    // Corrupt the queue from the side: an unreadable status value makes the
    // next read fail to parse.
    let side = Database::open_at(&path).unwrap();
    side.conn()
        .execute(
            "INSERT INTO outbox (conversation_id, message_id, sender, body, created_at, status)
             VALUES ('not-a-conv', 'not-a-msg', 'me', 'junk', 'whenever', 'garbled')",
            [],
        )
        .unwrap();

    link(&rig, true, 0, true).await;

    let mut failed = false;
    for _ in 0..4 {
        match recv_event(&mut rig.events).await {
            EngineEvent::SyncFailed => {
                failed = true;
            }
            EngineEvent::SyncStatus { text: Some(text) } => {
                assert_eq!(text, "Sync failed. Will retry automatically.");
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(failed, "expected the cycle to report failure");

    // Queue untouched, message still pending, ready for the next trigger.
    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 2);
    let conversations = rig.handle.conversations().await.unwrap();
    assert_eq!(
        status_of(&conversations, rig.conversation_id, 0),
        MessageStatus::Pending
    );

    // Once the bad row is gone the retry goes through.
    side.conn()
        .execute("DELETE FROM outbox WHERE status = 'garbled'", [])
        .unwrap();
    link(&rig, true, 0, true).await;

    let mut settled = false;
    for _ in 0..8 {
        if let EngineEvent::SyncSettled { .. } = recv_event(&mut rig.events).await {
            settled = true;
            break;
        }
    }
    assert!(settled);
    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_message_retry_follows_the_send_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), true);

    let id = rig
        .handle
        .send_message(rig.conversation_id, "did this go through?")
        .await
        .unwrap();
    let _ = recv_event(&mut rig.events).await;

    // Delivery report says no.
    rig.handle.mark_failed(rig.conversation_id, id).await.unwrap();
    match recv_event(&mut rig.events).await {
        EngineEvent::MessageStatusChanged { status, .. } => {
            assert_eq!(status, MessageStatus::Failed)
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Retrying while online delivers immediately.
    rig.handle.retry_message(rig.conversation_id, id).await.unwrap();
    match recv_event(&mut rig.events).await {
        EngineEvent::MessageStatusChanged { status, .. } => {
            assert_eq!(status, MessageStatus::Sent)
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Fail it again, go offline: the retry re-enters the queue instead.
    rig.handle.mark_failed(rig.conversation_id, id).await.unwrap();
    let _ = recv_event(&mut rig.events).await;
    link(&rig, false, 0, false).await;

    rig.handle.retry_message(rig.conversation_id, id).await.unwrap();
    match recv_event(&mut rig.events).await {
        EngineEvent::MessageStatusChanged { status, .. } => {
            assert_eq!(status, MessageStatus::Pending)
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn queued_message_cannot_be_failed() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), false);

    let id = rig
        .handle
        .send_message(rig.conversation_id, "still in the queue")
        .await
        .unwrap();
    let _ = recv_event(&mut rig.events).await;

    rig.handle.mark_failed(rig.conversation_id, id).await.unwrap();
    let _ = rig.handle.conversations().await.unwrap();

    assert!(drain_ready_events(&mut rig.events).is_empty());
    let conversations = rig.handle.conversations().await.unwrap();
    assert_eq!(
        status_of(&conversations, rig.conversation_id, 0),
        MessageStatus::Pending
    );
}

#[tokio::test(start_paused = true)]
async fn monitor_bridge_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), false);

    let (signal_tx, updates) = spawn_monitor(false);
    bridge_link_updates(updates, rig.cmd_tx.clone());

    rig.handle
        .send_message(rig.conversation_id, "waiting for a node")
        .await
        .unwrap();
    let _ = recv_event(&mut rig.events).await;

    // Discovery sees a peer: that transition alone must start a relay drain.
    signal_tx
        .send(LinkSignal::PeerDiscovered(MeshPeer::new("if_tech", 4)))
        .await
        .unwrap();

    let mut settled = false;
    for _ in 0..8 {
        if let EngineEvent::SyncSettled { mode, .. } = recv_event(&mut rig.events).await {
            assert_eq!(mode, DeliveryMode::Relay);
            settled = true;
            break;
        }
    }
    assert!(settled);
    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn incoming_messages_bump_unread_until_read() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = spawn_rig(&dir.path().join("dorm.db"), true);

    rig.handle
        .receive_message(rig.conversation_id, "zee_vibes", "you up?")
        .await
        .unwrap();
    let _ = recv_event(&mut rig.events).await;

    let conversations = rig.handle.conversations().await.unwrap();
    assert_eq!(conversations[0].unread_count, 1);
    assert_eq!(conversations[0].last_message, "you up?");

    rig.handle.mark_read(rig.conversation_id).await.unwrap();
    let conversations = rig.handle.conversations().await.unwrap();
    assert_eq!(conversations[0].unread_count, 0);
}

#[tokio::test(start_paused = true)]
async fn empty_message_bodies_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let rig = spawn_rig(&dir.path().join("dorm.db"), true);

    let result = rig.handle.send_message(rig.conversation_id, "   ").await;
    assert!(result.is_err());
    assert_eq!(rig.handle.outbox_depth().await.unwrap(), 0);
}
