//! CRUD operations for the durable outbox.
//!
//! Rows are kept in insertion order (`seq`). Reads are snapshots; rows are
//! removed only by [`Database::clear_outbox`] once a delivery cycle has
//! settled for the whole queue.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use dormlink_shared::types::{ConversationId, MessageId, MessageStatus, SenderId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{Message, OutboxEntry};

impl Database {
    /// Append an entry to the outbox.
    pub fn enqueue(&self, entry: &OutboxEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO outbox (conversation_id, message_id, sender, body, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.conversation_id.to_string(),
                entry.message.id.to_string(),
                entry.message.sender.as_str(),
                entry.message.text,
                entry.message.created_at.to_rfc3339(),
                entry.message.status.as_str(),
            ],
        )?;

        tracing::debug!(
            conversation = %entry.conversation_id,
            message = %entry.message.id,
            "enqueued outbox entry"
        );
        Ok(())
    }

    /// Return the full ordered list of queued entries without removing them.
    ///
    /// This is the read view a drain cycle acts upon.
    pub fn pending(&self) -> Result<Vec<OutboxEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT conversation_id, message_id, sender, body, created_at, status
             FROM outbox
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map([], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Number of queued entries.
    pub fn outbox_depth(&self) -> Result<u64> {
        let count: u64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove all entries. Called only after a successful delivery cycle
    /// completes for the whole queue.
    pub fn clear_outbox(&self) -> Result<()> {
        let removed = self.conn().execute("DELETE FROM outbox", [])?;
        if removed > 0 {
            tracing::debug!(removed, "cleared outbox");
        }
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let conversation_str: String = row.get(0)?;
    let message_str: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let body: String = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;

    let conversation_id = Uuid::parse_str(&conversation_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let message_id = Uuid::parse_str(&message_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let status: MessageStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(OutboxEntry {
        conversation_id: ConversationId(conversation_id),
        message: Message {
            id: MessageId(message_id),
            sender: SenderId::from(sender),
            text: body,
            created_at,
            status,
        },
    })
}
