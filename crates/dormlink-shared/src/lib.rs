//! # dormlink-shared
//!
//! Types shared across the Dormlink messaging core: identifier newtypes,
//! message statuses, the delivery-mode resolver, and tuning constants.

pub mod constants;
pub mod delivery;
pub mod types;

pub use delivery::DeliveryMode;
pub use types::{ConversationId, MessageId, MessageStatus, PeerId, SenderId};
