//! Rate control for status observers

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a status observer wants to hear from the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StatusRate {
    /// Every tick
    EveryTick,

    /// At most this many times per second.
    /// Rates at or above the poll rate collapse to `EveryTick`.
    Max(u32),
}

impl StatusRate {
    /// Normalize rate against the loop's poll frequency
    pub fn normalize(self, poll_hz: f64) -> Self {
        match self {
            StatusRate::EveryTick => StatusRate::EveryTick,
            StatusRate::Max(0) => StatusRate::EveryTick,
            StatusRate::Max(hz) if hz as f64 >= poll_hz => StatusRate::EveryTick,
            StatusRate::Max(hz) => StatusRate::Max(hz),
        }
    }

    /// Throttle interval, if any
    pub fn throttle_interval(self, poll_hz: f64) -> Option<Duration> {
        match self.normalize(poll_hz) {
            StatusRate::EveryTick => None,
            StatusRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
