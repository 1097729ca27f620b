//! Domain model for comments and notifications.
//!
//! # Responsibility
//! - Define the records exchanged with the persistence service.
//! - Keep validation and derived values next to the data they describe.
//!
//! # Invariants
//! - Timestamps are Unix epoch milliseconds.
//! - Comments and notifications are never deleted by core.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod comment;
pub mod notification;

/// Current wall-clock time in epoch milliseconds; `0` if the clock is before 1970.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
