//! Sync engine orchestration with the tokio mpsc command/event pattern.
//!
//! The engine runs in a dedicated tokio task that owns the durable outbox
//! database and the conversation projection. External code communicates with
//! it through typed command and event channels.
//!
//! Each drain cycle runs to completion inside one command dispatch
//! (`Idle → Syncing → Settled`), so at most one cycle is ever in flight:
//! commands arriving mid-cycle are buffered by the channel and see the
//! settled state. A trigger processed after the queue emptied is a no-op.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use dormlink_mesh::LinkUpdate;
use dormlink_shared::constants::CHANNEL_CAPACITY;
use dormlink_shared::types::{ConversationId, MessageId, MessageStatus};
use dormlink_shared::DeliveryMode;
use dormlink_store::{Database, Message, OutboxEntry};

use crate::config::EngineConfig;
use crate::conversations::{Conversation, ConversationList};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Submit a message authored on this device.
    Send {
        conversation_id: ConversationId,
        text: String,
        reply: oneshot::Sender<Result<MessageId>>,
    },
    /// Deliver a message received from a peer into its conversation.
    Receive {
        conversation_id: ConversationId,
        handle: String,
        text: String,
    },
    /// Re-attempt delivery of a failed message.
    Retry {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// External delivery report: mark a delivered message as failed.
    MarkFailed {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// The user opened a conversation; reset its unread counter.
    MarkRead { conversation_id: ConversationId },
    /// Link state change republished by the connectivity monitor.
    Link(LinkUpdate),
    /// Ask for a drain cycle on the next loop turn.
    Kick,
    /// Clear the status toast if `seq` is still the current one.
    ExpireStatus { seq: u64 },
    /// Request a snapshot of the conversation list.
    GetConversations(oneshot::Sender<Vec<Conversation>>),
    /// Request the current outbox depth.
    GetOutboxDepth(oneshot::Sender<Result<u64>>),
    /// Gracefully shut down the engine.
    Shutdown,
}

/// Events sent *from* the engine task to the application.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A message was appended to a conversation.
    MessageAppended {
        conversation_id: ConversationId,
        message: Message,
    },
    /// A single message's status changed (retry or failure report).
    MessageStatusChanged {
        conversation_id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    },
    /// A drain cycle started under the given mode.
    SyncStarted { mode: DeliveryMode },
    /// A drain cycle settled: these messages left the pending state.
    SyncSettled {
        mode: DeliveryMode,
        delivered: Vec<MessageId>,
    },
    /// A drain cycle aborted on a storage fault; the queue is intact.
    SyncFailed,
    /// Transient sync status toast text; `None` clears it.
    SyncStatus { text: Option<String> },
    /// Entries rehydrated from a previous session.
    OutboxRestored { count: usize },
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the sync engine in a background tokio task.
///
/// Any outbox entries persisted by a previous session are rehydrated into
/// `conversations` before the first command is processed, so no submitted
/// message is lost across a restart.
///
/// Returns channels for sending commands and receiving events. The task
/// exits when all command senders are dropped or a
/// [`EngineCommand::Shutdown`] arrives.
pub fn spawn_engine(
    db: Database,
    conversations: ConversationList,
    config: EngineConfig,
) -> (mpsc::Sender<EngineCommand>, mpsc::Receiver<EngineEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<EngineCommand>(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(CHANNEL_CAPACITY);

    // The engine only holds a weak handle to its own command channel, so
    // dropping every external sender still shuts the loop down.
    let self_tx = cmd_tx.downgrade();

    tokio::spawn(async move {
        let mut engine = Engine {
            online: config.initial_online,
            peer_count: 0,
            toast_seq: 0,
            db,
            conversations,
            config,
            self_tx,
            event_tx,
        };

        engine.rehydrate().await;
        info!(online = engine.online, "sync engine started");

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                EngineCommand::Send {
                    conversation_id,
                    text,
                    reply,
                } => {
                    let result = engine.handle_send(conversation_id, text).await;
                    let _ = reply.send(result);
                }
                EngineCommand::Receive {
                    conversation_id,
                    handle,
                    text,
                } => {
                    engine.handle_receive(conversation_id, handle, text).await;
                }
                EngineCommand::Retry {
                    conversation_id,
                    message_id,
                } => {
                    engine.handle_retry(conversation_id, message_id).await;
                }
                EngineCommand::MarkFailed {
                    conversation_id,
                    message_id,
                } => {
                    engine.handle_mark_failed(conversation_id, message_id).await;
                }
                EngineCommand::MarkRead { conversation_id } => {
                    engine.conversations.mark_read(conversation_id);
                }
                EngineCommand::Link(update) => {
                    debug!(
                        online = update.online,
                        peer_count = update.peer_count,
                        trigger = update.trigger,
                        "link update"
                    );
                    engine.online = update.online;
                    engine.peer_count = update.peer_count;
                    if update.trigger {
                        engine.drain().await;
                    }
                }
                EngineCommand::Kick => {
                    engine.drain().await;
                }
                EngineCommand::ExpireStatus { seq } => {
                    if seq == engine.toast_seq {
                        engine
                            .emit(EngineEvent::SyncStatus { text: None })
                            .await;
                    }
                }
                EngineCommand::GetConversations(reply) => {
                    let _ = reply.send(engine.conversations.all().to_vec());
                }
                EngineCommand::GetOutboxDepth(reply) => {
                    let depth = engine.db.outbox_depth().map_err(EngineError::from);
                    let _ = reply.send(depth);
                }
                EngineCommand::Shutdown => {
                    info!("sync engine shutdown requested");
                    break;
                }
            }
        }

        info!("sync engine terminated");
    });

    (cmd_tx, event_rx)
}

/// Forward link updates from the connectivity monitor into the engine.
///
/// Spawns a small bridging task that ends when either side goes away.
pub fn bridge_link_updates(
    mut updates: mpsc::Receiver<LinkUpdate>,
    cmd_tx: mpsc::Sender<EngineCommand>,
) {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if cmd_tx.send(EngineCommand::Link(update)).await.is_err() {
                break;
            }
        }
        debug!("link update bridge ended");
    });
}

// ---------------------------------------------------------------------------
// Engine internals
// ---------------------------------------------------------------------------

struct Engine {
    online: bool,
    peer_count: usize,
    /// Monotonic toast sequence; an expiry only clears its own toast.
    toast_seq: u64,
    db: Database,
    conversations: ConversationList,
    config: EngineConfig,
    self_tx: mpsc::WeakSender<EngineCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Engine {
    /// Merge any entries that survived a prior session back into their
    /// conversations. Failures are non-fatal: the rows stay queued on disk
    /// and the next successful open picks them up.
    async fn rehydrate(&mut self) {
        match self.db.pending() {
            Ok(entries) if entries.is_empty() => {}
            Ok(entries) => {
                let count = self.conversations.restore(&entries);
                info!(count, "rehydrated outbox entries");
                self.emit(EngineEvent::OutboxRestored { count }).await;
            }
            Err(e) => {
                error!(error = %e, "failed to load persisted outbox");
            }
        }
    }

    async fn handle_send(
        &mut self,
        conversation_id: ConversationId,
        text: String,
    ) -> Result<MessageId> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        if !self.conversations.contains(conversation_id) {
            return Err(EngineError::UnknownConversation(conversation_id));
        }

        let mode = DeliveryMode::resolve(self.online, self.peer_count);
        let message = Message::outgoing(text, mode);

        if message.status.is_pending() {
            let entry = OutboxEntry::new(conversation_id, message.clone());
            if let Err(e) = self.db.enqueue(&entry) {
                // The message stays in memory either way; the queue row is
                // what we could not write.
                error!(error = %e, message = %message.id, "failed to persist outbox entry");
                self.show_status("Couldn't save message for offline delivery.")
                    .await;
            }
            if self.peer_count > 0 {
                self.schedule_kick();
            }
        }

        info!(
            conversation = %conversation_id,
            message = %message.id,
            status = %message.status,
            "message submitted"
        );

        self.conversations
            .append_message(conversation_id, message.clone());
        let message_id = message.id;
        self.emit(EngineEvent::MessageAppended {
            conversation_id,
            message,
        })
        .await;

        Ok(message_id)
    }

    async fn handle_receive(
        &mut self,
        conversation_id: ConversationId,
        handle: String,
        text: String,
    ) {
        if !self.conversations.contains(conversation_id) {
            warn!(conversation = %conversation_id, "received message for unknown conversation");
            return;
        }

        let message = Message::incoming(handle, text);
        self.conversations
            .append_message(conversation_id, message.clone());
        self.emit(EngineEvent::MessageAppended {
            conversation_id,
            message,
        })
        .await;
    }

    /// Re-enter a failed message into the send path: delivered immediately
    /// when online, queued again otherwise.
    async fn handle_retry(&mut self, conversation_id: ConversationId, message_id: MessageId) {
        let Some(message) = self
            .conversations
            .get(conversation_id)
            .and_then(|c| c.message(message_id))
            .cloned()
        else {
            warn!(message = %message_id, "retry for unknown message");
            return;
        };
        if message.status != MessageStatus::Failed {
            warn!(
                message = %message_id,
                status = %message.status,
                "retry ignored: message has not failed"
            );
            return;
        }

        let status = if self.online {
            MessageStatus::Sent
        } else {
            MessageStatus::Pending
        };
        self.conversations
            .set_status(conversation_id, message_id, status);

        if status.is_pending() {
            let mut requeued = message;
            requeued.status = MessageStatus::Pending;
            let entry = OutboxEntry::new(conversation_id, requeued);
            if let Err(e) = self.db.enqueue(&entry) {
                error!(error = %e, message = %message_id, "failed to requeue message");
                self.show_status("Couldn't save message for offline delivery.")
                    .await;
            }
            if self.peer_count > 0 {
                self.schedule_kick();
            }
        }

        info!(message = %message_id, status = %status, "message retried");
        self.emit(EngineEvent::MessageStatusChanged {
            conversation_id,
            message_id,
            status,
        })
        .await;
    }

    /// External delivery report. Only a message already in a terminal state
    /// can be failed: a pending message belongs to the outbox and will be
    /// retried, never failed.
    async fn handle_mark_failed(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) {
        let Some(message) = self
            .conversations
            .get(conversation_id)
            .and_then(|c| c.message(message_id))
        else {
            warn!(message = %message_id, "failure report for unknown message");
            return;
        };
        if message.status.is_pending() {
            warn!(message = %message_id, "failure report ignored: message still queued");
            return;
        }

        self.conversations
            .set_status(conversation_id, message_id, MessageStatus::Failed);
        warn!(message = %message_id, "message marked failed");
        self.emit(EngineEvent::MessageStatusChanged {
            conversation_id,
            message_id,
            status: MessageStatus::Failed,
        })
        .await;
    }

    /// One drain cycle: resolve the mode, simulate the round trip, settle
    /// every pending message, clear the queue.
    async fn drain(&mut self) {
        let mode = DeliveryMode::resolve(self.online, self.peer_count);
        let Some(settled_status) = mode.settled_status() else {
            debug!("no transport available, drain skipped");
            return;
        };

        let entries = match self.db.pending() {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "failed to read outbox, drain aborted");
                self.emit(EngineEvent::SyncFailed).await;
                self.show_status("Sync failed. Will retry automatically.")
                    .await;
                return;
            }
        };
        if entries.is_empty() {
            debug!("outbox empty, nothing to drain");
            return;
        }

        info!(mode = ?mode, queued = entries.len(), "drain cycle started");
        self.emit(EngineEvent::SyncStarted { mode }).await;
        self.show_status(format!("Syncing via {}...", mode.via()))
            .await;

        // Simulated network round trip.
        tokio::time::sleep(self.config.sync_delay).await;

        let delivered = self.conversations.settle_pending(settled_status);

        if let Err(e) = self.db.clear_outbox() {
            // Statuses already flipped; the stale rows settle to nothing on
            // the next cycle, after which the clear is retried.
            error!(error = %e, "failed to clear outbox, drain aborted");
            self.emit(EngineEvent::SyncFailed).await;
            self.show_status("Sync failed. Will retry automatically.")
                .await;
            return;
        }

        info!(mode = ?mode, delivered = delivered.len(), "drain cycle settled");
        self.emit(EngineEvent::SyncSettled { mode, delivered }).await;

        let copy = match mode {
            DeliveryMode::Direct => "Success! All messages synchronized.",
            _ => "Success! All messages relayed via mesh.",
        };
        self.show_status(copy).await;
    }

    /// Show a transient status toast and schedule its expiry.
    async fn show_status(&mut self, text: impl Into<String>) {
        self.toast_seq += 1;
        let seq = self.toast_seq;
        self.emit(EngineEvent::SyncStatus {
            text: Some(text.into()),
        })
        .await;

        let ttl = self.config.status_ttl;
        let weak = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(EngineCommand::ExpireStatus { seq }).await;
            }
        });
    }

    /// Schedule a drain kick shortly after an offline send with peers
    /// already visible.
    fn schedule_kick(&self) {
        let delay = self.config.offline_kickoff;
        let weak = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(EngineCommand::Kick).await;
            }
        });
    }

    async fn emit(&mut self, event: EngineEvent) {
        // Takes `&mut self` rather than `&self`: `Engine` owns a rusqlite
        // connection and so is not `Sync`, which would make a captured
        // `&Engine` (and thus the spawned future) non-`Send`. A `&mut Engine`
        // only requires `Engine: Send`, which holds.
        let _ = self.event_tx.send(event).await;
    }
}
