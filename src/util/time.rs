//! Time utilities for the sync core

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get process uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Host poll interval for draining pending fire requests
pub const HOST_POLL_INTERVAL_MS: u64 = 30;
/// Quiet period before a kill total is written to persistence
pub const PERSIST_DEBOUNCE_MS: u64 = 2_000;
/// Max lifetime of a projectile that never collides
pub const PROJECTILE_TTL_MS: u64 = 3_000;
/// Max lifetime of a hit whose effect never reports completion
pub const HIT_TTL_MS: u64 = 1_500;

/// Milliseconds elapsed between `since` and `now`, saturating at zero
pub fn age_millis(since: u64, now: u64) -> u64 {
    now.saturating_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_saturates_for_future_timestamps() {
        assert_eq!(age_millis(1_000, 1_500), 500);
        assert_eq!(age_millis(2_000, 1_500), 0);
    }
}
