//! Wall-clock abstraction used to stamp outgoing dispersal requests.
//!
//! The accountant itself never reads a clock: callers pass the timestamp into
//! [`crate::Accountant::account_blob`], which keeps the charging math fully
//! deterministic under test. [`SystemClock`] is what production callers hand
//! to [`crate::Accountant::account_blob_now`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of nanosecond Unix timestamps.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> i64;
}

/// Clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos().min(i64::MAX as u128) as i64)
            .unwrap_or(0)
    }
}
