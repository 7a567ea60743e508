//! Environment knobs.

use std::time::Duration;

/// Deadline used by [`Flow::test_async_default`](crate::Flow::test_async_default)
/// when `PACKET_FLOW_TIMEOUT_MS` is unset or invalid.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Flow deadline, overridable with `PACKET_FLOW_TIMEOUT_MS`.
pub fn default_timeout() -> Duration {
    std::env::var("PACKET_FLOW_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT)
}
