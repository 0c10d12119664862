//! Server-side clock for document timestamps

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Hands out strictly increasing millisecond timestamps.
///
/// Every message `createdAt` and every summary `lastMessageAt` comes from here,
/// so ordering by timestamp never produces ties inside one store.
#[derive(Debug)]
pub struct ServerClock {
    last_millis: Mutex<i64>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Clock that will never return a value at or below `millis`
    pub fn starting_after(millis: i64) -> Self {
        Self {
            last_millis: Mutex::new(millis),
        }
    }

    /// Next timestamp in unix milliseconds
    pub fn now_millis(&self) -> i64 {
        let mut last = self.last_millis.lock();
        let next = Utc::now().timestamp_millis().max(*last + 1);
        *last = next;
        next
    }

    pub fn now(&self) -> DateTime<Utc> {
        from_millis(self.now_millis())
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
