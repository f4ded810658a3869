/// Application name
pub const APP_NAME: &str = "Dorm Room Connect";

/// Simulated network round-trip for one drain cycle, in milliseconds
pub const SYNC_ROUND_TRIP_MS: u64 = 1_500;

/// How long a transient sync status toast stays visible, in milliseconds
pub const SYNC_STATUS_TTL_MS: u64 = 3_000;

/// Delay before an offline send with visible peers kicks off a drain
pub const OFFLINE_KICKOFF_MS: u64 = 500;

/// A mesh peer not seen for this long is considered out of range
pub const PEER_STALE_SECS: u64 = 300;

/// Capacity of the engine and monitor mpsc channels
pub const CHANNEL_CAPACITY: usize = 256;

/// Maximum message body size in bytes (16 KiB)
pub const MAX_MESSAGE_SIZE: usize = 16_384;
