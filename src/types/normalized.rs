//! Canonical per-tick record

use serde::{Deserialize, Serialize};

use super::Position;

/// One vehicle's reading for one tick after unit conversion.
///
/// Field set and units are fixed: distances in meters, times in seconds, speed
/// in km/h, pedals in 0..100 %, steering in -100..+100 %.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedSample {
    pub lap_distance_m: f64,
    /// Time into the lap as reported by the source
    pub elapsed_s: f64,
    /// Zero-based sector index
    pub sector: u32,
    pub speed_kmh: f64,
    pub engine_rpm: f64,
    pub throttle_pct: f64,
    pub brake_pct: f64,
    pub steering_pct: f64,
    pub gear: i32,
    pub position: Option<Position>,
}

impl NormalizedSample {
    /// Whether `other` repeats this reading (a stale source frame).
    pub fn is_repeat_of(&self, other: &NormalizedSample) -> bool {
        self.elapsed_s == other.elapsed_s && self.lap_distance_m == other.lap_distance_m
    }
}
