//! v001 -- Initial schema creation.
//!
//! Creates the `outbox` table: one row per queued outgoing message, ordered
//! by insertion.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Outbox
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS outbox (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,               -- UUID v4
    message_id      TEXT NOT NULL UNIQUE,        -- UUID v7
    sender          TEXT NOT NULL,               -- "me" or a peer handle
    body            TEXT NOT NULL,
    created_at      TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    status          TEXT NOT NULL                -- message status at enqueue time
);

CREATE INDEX IF NOT EXISTS idx_outbox_conversation
    ON outbox(conversation_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
