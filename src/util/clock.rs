//! Wall-clock helpers shared across the runtime.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Falls back to 0 if the system clock is before the epoch, which keeps the
/// value usable as an ordering-irrelevant timestamp rather than panicking.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
