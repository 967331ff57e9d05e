//! Raw per-vehicle readings as delivered by a sample source

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable slot id the simulation assigns to a vehicle for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who is driving a vehicle.
///
/// Mirrors the simulation's control field: `-1` nobody, `0` local player,
/// `1` AI, `2` remote player, `3` replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSource {
    /// The human at this machine
    LocalHuman,
    /// A human connected over the network
    RemoteHuman,
    /// Computer controlled
    Ai,
    /// Replay playback
    Replay,
    /// Empty slot
    #[default]
    Nobody,
}

impl ControlSource {
    /// Map the simulation's numeric control code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ControlSource::LocalHuman,
            1 => ControlSource::Ai,
            2 => ControlSource::RemoteHuman,
            3 => ControlSource::Replay,
            _ => ControlSource::Nobody,
        }
    }

    /// Whether this vehicle belongs to someone other than the local driver.
    pub fn is_opponent(self) -> bool {
        matches!(self, ControlSource::RemoteHuman | ControlSource::Ai)
    }
}

/// Who and what a vehicle is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleIdentity {
    pub id: VehicleId,
    pub driver_name: String,
    /// Entry name, e.g. `"Action Express Racing #311:LM"`
    pub vehicle_name: String,
    pub car_class: Option<String>,
    pub team_name: Option<String>,
    /// Race position at the time of the reading
    pub race_position: Option<u32>,
}

impl VehicleIdentity {
    pub fn new(id: u32, driver_name: impl Into<String>) -> Self {
        Self { id: VehicleId(id), driver_name: driver_name.into(), ..Default::default() }
    }
}

/// World position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One vehicle's reading for one poll tick, in the source's engineering units.
///
/// `time_into_lap_s` and `last_lap_time_s` are distinct channels: the first
/// resets at every line crossing, the second only changes at the crossing and
/// holds the time of the lap that just finished. Lap boundaries consume
/// `last_lap_time_s`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSample {
    pub identity: VehicleIdentity,
    pub control: ControlSource,
    /// Lap the vehicle is currently on
    pub lap_number: u32,
    /// Distance from the start/finish line (m)
    pub lap_distance_m: f64,
    /// Time into the current lap (s)
    pub time_into_lap_s: f64,
    /// Time of the last completed lap (s), absent or non-positive when unknown
    pub last_lap_time_s: Option<f64>,
    /// Speed (m/s)
    pub speed_ms: f64,
    pub engine_rpm: f64,
    /// Throttle pedal, 0..1
    pub throttle: f64,
    /// Brake pedal, 0..1
    pub brake: f64,
    /// Steering input relative to full physical travel, signed
    pub steering: f64,
    pub gear: i32,
    pub position: Option<Position>,
    pub in_pits: bool,
    pub in_garage: bool,
    /// Sector 1 split for the current lap (s), non-positive until crossed
    pub sector1_split_s: Option<f64>,
    /// Sector 2 split for the current lap (s), non-positive until crossed
    pub sector2_split_s: Option<f64>,
}

impl RawSample {
    pub fn vehicle_id(&self) -> VehicleId {
        self.identity.id
    }

    /// The reported last-lap time when the source considers it valid.
    pub fn reported_last_lap_time(&self) -> Option<f64> {
        self.last_lap_time_s.filter(|t| t.is_finite() && *t > 0.0)
    }

    /// Whether the vehicle is parked in the pit lane or garage.
    pub fn in_pit_or_garage(&self) -> bool {
        self.in_pits || self.in_garage
    }
}
