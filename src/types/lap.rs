//! Finalized lap records handed to lap sinks

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ControlSource, NormalizedSample, SessionId, VehicleIdentity};

/// Why a finalized lap is marked incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Vehicle stopped progressing, or sat in the pits or garage
    Inactivity,
    /// Lap distance jumped backwards without a lap increment
    Teleport,
    /// The sample source went away mid-lap
    SourceLost,
    /// Too few samples or an implausibly short lap time
    TooShort,
    /// Buffering began away from the start/finish line
    JoinedMidLap,
}

impl DiscardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscardReason::Inactivity => "inactivity",
            DiscardReason::Teleport => "teleport",
            DiscardReason::SourceLost => "source_lost",
            DiscardReason::TooShort => "too_short",
            DiscardReason::JoinedMidLap => "joined_mid_lap",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a lap's time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapTimeSource {
    /// The source's last-completed-lap channel
    Reported,
    /// Elapsed time of the last buffered sample
    Buffered,
}

/// One lap's worth of samples for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedLap {
    pub identity: VehicleIdentity,
    pub control: ControlSource,
    pub session_id: Option<SessionId>,
    pub lap_number: u32,
    pub lap_time_s: f64,
    pub lap_time_source: LapTimeSource,
    pub samples: Vec<NormalizedSample>,
    pub discard_reason: Option<DiscardReason>,
    /// Lap distances where sector splits were first reported this lap
    pub sector_crossings_m: Vec<f64>,
    /// Set when a retention policy kept this lap as the vehicle's best
    pub is_fastest: bool,
}

impl CompletedLap {
    /// `true` unless a discard condition fired.
    pub fn completed(&self) -> bool {
        self.discard_reason.is_none()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn summary(&self) -> LapSummary {
        LapSummary {
            lap_number: self.lap_number,
            lap_time_s: self.lap_time_s,
            samples_count: self.samples.len(),
            lap_distance_m: self.samples.iter().map(|s| s.lap_distance_m).fold(0.0, f64::max),
            completed: self.completed(),
            discard_reason: self.discard_reason,
        }
    }
}

/// Compact description of a lap for logs and status displays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LapSummary {
    pub lap_number: u32,
    pub lap_time_s: f64,
    pub samples_count: usize,
    pub lap_distance_m: f64,
    pub completed: bool,
    pub discard_reason: Option<DiscardReason>,
}
