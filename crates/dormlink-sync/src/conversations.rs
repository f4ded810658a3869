//! In-memory conversation projection.
//!
//! Conversations hold the append-only message sequences shown in the UI,
//! plus denormalized `last_message` / `last_message_time` / `unread_count`
//! fields recomputed whenever a sequence changes. The durable outbox, not
//! this structure, is the source of truth for undelivered messages; the
//! list here can be rebuilt at any time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dormlink_shared::types::{ConversationId, MessageId, MessageStatus};
use dormlink_store::{Message, OutboxEntry};

/// The peer on the other end of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    pub handle: String,
    pub is_online: bool,
}

impl Participant {
    pub fn new(name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: handle.into(),
            is_online: false,
        }
    }
}

/// One direct-message thread with a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant: Participant,
    /// Body of the most recently appended message.
    pub last_message: String,
    /// Creation time of the most recently appended message.
    pub last_message_time: Option<DateTime<Utc>>,
    /// Messages from the peer not yet seen by the user.
    pub unread_count: u32,
    /// Append-only message sequence, oldest first.
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(participant: Participant) -> Self {
        Self {
            id: ConversationId::new(),
            participant,
            last_message: String::new(),
            last_message_time: None,
            unread_count: 0,
            messages: Vec::new(),
        }
    }

    /// Append a message and recompute the denormalized tail fields. A
    /// message from the peer counts as unread.
    pub fn append(&mut self, message: Message) {
        if !message.sender.is_me() {
            self.unread_count += 1;
        }
        self.messages.push(message);
        self.recompute_tail();
    }

    /// Refresh `last_message` / `last_message_time` from the sequence tail.
    fn recompute_tail(&mut self) {
        if let Some(tail) = self.messages.last() {
            self.last_message = tail.text.clone();
            self.last_message_time = Some(tail.created_at);
        } else {
            self.last_message.clear();
            self.last_message_time = None;
        }
    }

    /// Whether any message is still queued for delivery.
    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(|m| m.status.is_pending())
    }

    /// Whether any message failed delivery.
    pub fn has_failed(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.status == MessageStatus::Failed)
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// The full conversation list, as projected for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationList {
    conversations: Vec<Conversation>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demo roster matching the seeded campus conversations.
    pub fn campus_demo() -> Self {
        let mut zainab = Conversation::new(Participant {
            name: "Zainab".into(),
            handle: "zee_vibes".into(),
            is_online: true,
        });
        zainab.append(Message::incoming("zee_vibes", "Hey, are you coming for the lunch?"));
        zainab.append(Message::outgoing(
            "Yeah, just finishing my lab work.",
            dormlink_shared::DeliveryMode::Direct,
        ));
        zainab.append(Message::incoming("zee_vibes", "The jollof was fire! 🔥"));

        let mut ifeanyi = Conversation::new(Participant::new("Ifeanyi", "if_tech"));
        ifeanyi.append(Message::incoming("if_tech", "Did you see the new mesh update?"));
        ifeanyi.unread_count = 0;

        let mut list = Self::new();
        list.insert(zainab);
        list.insert(ifeanyi);
        list
    }

    pub fn insert(&mut self, conversation: Conversation) {
        self.conversations.push(conversation);
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.get(id).is_some()
    }

    /// Append a message to its conversation. Returns false if the
    /// conversation is unknown.
    pub fn append_message(&mut self, id: ConversationId, message: Message) -> bool {
        match self.get_mut(id) {
            Some(conversation) => {
                conversation.append(message);
                true
            }
            None => {
                warn!(conversation = %id, "append to unknown conversation");
                false
            }
        }
    }

    /// Update one message's status. The sequence tail is untouched, so the
    /// denormalized fields stay valid.
    pub fn set_status(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };
        match conversation.message_mut(message_id) {
            Some(message) => {
                message.status = status;
                true
            }
            None => false,
        }
    }

    /// Flip every currently pending message to the given terminal status.
    /// Messages already in a terminal state are left untouched. Returns the
    /// ids of the messages that changed.
    pub fn settle_pending(&mut self, status: MessageStatus) -> Vec<MessageId> {
        let mut settled = Vec::new();
        for conversation in &mut self.conversations {
            for message in &mut conversation.messages {
                if message.status.is_pending() {
                    message.status = status;
                    settled.push(message.id);
                }
            }
        }
        debug!(count = settled.len(), status = %status, "settled pending messages");
        settled
    }

    /// Merge rehydrated outbox entries back into their conversations,
    /// keeping whatever status each message held when it was persisted.
    ///
    /// An entry whose conversation no longer exists gets a stub
    /// conversation rather than being dropped: queued messages must never
    /// be silently lost across a restart.
    pub fn restore(&mut self, entries: &[OutboxEntry]) -> usize {
        for entry in entries {
            if !self.contains(entry.conversation_id) {
                let mut stub = Conversation::new(Participant::new("Unknown", "unknown"));
                stub.id = entry.conversation_id;
                warn!(
                    conversation = %entry.conversation_id,
                    "restoring queued message into missing conversation"
                );
                self.insert(stub);
            }
            self.append_message(entry.conversation_id, entry.message.clone());
        }
        entries.len()
    }

    /// Reset a conversation's unread counter (the user opened it).
    pub fn mark_read(&mut self, id: ConversationId) {
        if let Some(conversation) = self.get_mut(id) {
            conversation.unread_count = 0;
        }
    }

    /// All conversations, hiding those whose participant handle is blocked.
    pub fn visible(&self, blocked: &HashSet<String>) -> Vec<&Conversation> {
        self.conversations
            .iter()
            .filter(|c| !blocked.contains(&c.participant.handle))
            .collect()
    }

    pub fn all(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
