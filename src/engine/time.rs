//! Wall-clock helpers used by the codec, the key directory, and the engine.
//!
//! Everything in the engine measures time as milliseconds since the Unix
//! epoch, so it round-trips through the on-disk `i64` fields without loss.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The current time, in milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

/// `(created, expired)` for a `Set` with the given optional TTL. `expired`
/// is `0` when `ttl` is `None` or zero, meaning "never expires".
pub fn unix_millis_with_expiration(ttl: Option<Duration>) -> (i64, i64) {
    let created = unix_millis();
    let expired = match ttl {
        Some(ttl) if !ttl.is_zero() => created + ttl.as_millis() as i64,
        _ => 0,
    };
    (created, expired)
}
