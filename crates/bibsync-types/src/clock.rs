use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Wall-clock instant used for every stored timestamp.
pub type Timestamp = DateTime<Utc>;

/// Strictly increasing UTC clock.
///
/// Each call returns the wall-clock time, or one microsecond past the last
/// issued value if the wall clock has not moved (or moved backwards). Two
/// writes through the same clock therefore never share a timestamp, which
/// keeps "updated after" comparisons meaningful for back-to-back writes.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<Timestamp>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock whose first reading is strictly after `floor`.
    pub fn starting_after(floor: Timestamp) -> Self {
        Self {
            last: Mutex::new(Some(floor)),
        }
    }

    /// Issue the next timestamp.
    pub fn now(&self) -> Timestamp {
        let wall = Utc::now();
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = match *last {
            Some(prev) if wall <= prev => prev + Duration::microseconds(1),
            _ => wall,
        };
        *last = Some(next);
        next
    }

    /// The most recently issued timestamp, if any.
    pub fn last(&self) -> Option<Timestamp> {
        *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
