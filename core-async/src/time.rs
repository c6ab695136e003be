//! Time utilities.
//!
//! `Instant` is the tokio clock so that throttles and grace timers follow
//! paused time in tests.

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{
    interval, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior, Sleep, Timeout,
};

/// Error returned when a [`timeout`] elapses.
pub use tokio::time::error::Elapsed;

/// Milliseconds since the UNIX epoch, saturating to zero for clocks set
/// before 1970.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
