//! # dormlink-store
//!
//! Durable outbox storage for the Dormlink messaging core, backed by SQLite.
//!
//! The outbox is the single source of truth for "submitted but not yet
//! confirmed delivered". The in-memory conversation list may be rebuilt at
//! any time; the rows here survive process restarts and are removed only by
//! an explicit [`Database::clear_outbox`] after a delivery cycle settles.

pub mod database;
pub mod migrations;
pub mod models;
pub mod outbox;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::{Message, OutboxEntry};
