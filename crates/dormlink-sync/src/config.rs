//! Engine configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the engine can start with zero
//! configuration.

use std::time::Duration;

use dormlink_shared::constants::{OFFLINE_KICKOFF_MS, SYNC_ROUND_TRIP_MS, SYNC_STATUS_TTL_MS};

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Simulated network round-trip for one drain cycle.
    /// Env: `DORMLINK_SYNC_DELAY_MS`
    /// Default: 1500
    pub sync_delay: Duration,

    /// How long a transient sync status toast stays visible.
    /// Env: `DORMLINK_STATUS_TTL_MS`
    /// Default: 3000
    pub status_ttl: Duration,

    /// Delay before an offline send with visible peers kicks off a drain.
    /// Env: `DORMLINK_KICKOFF_MS`
    /// Default: 500
    pub offline_kickoff: Duration,

    /// Link state assumed until the first monitor update arrives.
    /// Env: `DORMLINK_ASSUME_ONLINE` (true/false)
    /// Default: `false`
    pub initial_online: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_delay: Duration::from_millis(SYNC_ROUND_TRIP_MS),
            status_ttl: Duration::from_millis(SYNC_STATUS_TTL_MS),
            offline_kickoff: Duration::from_millis(OFFLINE_KICKOFF_MS),
            initial_online: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = read_millis("DORMLINK_SYNC_DELAY_MS") {
            config.sync_delay = ms;
        }
        if let Some(ms) = read_millis("DORMLINK_STATUS_TTL_MS") {
            config.status_ttl = ms;
        }
        if let Some(ms) = read_millis("DORMLINK_KICKOFF_MS") {
            config.offline_kickoff = ms;
        }
        if let Ok(val) = std::env::var("DORMLINK_ASSUME_ONLINE") {
            config.initial_online = val != "false" && val != "0";
        }

        config
    }
}

fn read_millis(var: &str) -> Option<Duration> {
    let raw = std::env::var(var).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(var, value = %raw, "invalid duration, using default");
            None
        }
    }
}
