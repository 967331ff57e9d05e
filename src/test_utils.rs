//! Test utilities for building sample streams and observing emitted laps
//!
//! Shared by unit tests, integration tests and benches (behind the
//! `benchmark` feature).

#![cfg(any(test, feature = "benchmark"))]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::Result;
use crate::sink::{LapEvent, LapOrigin, LapSink};
use crate::types::{
    CompletedLap, ControlSource, RawSample, SessionId, SessionMetadata, SessionType,
    VehicleIdentity,
};

/// Session id used throughout the tests.
pub const TEST_SESSION: &str = "test-session";

/// Track length used when a test does not care.
pub const TEST_TRACK_LENGTH_M: f64 = 5400.0;

pub fn test_session() -> SessionId {
    SessionId::parse(TEST_SESSION).expect("test session id is not blank")
}

/// Metadata for [`TEST_SESSION`] on a [`TEST_TRACK_LENGTH_M`] track.
pub fn test_metadata() -> SessionMetadata {
    SessionMetadata {
        session_id: Some(test_session()),
        session_type: SessionType::Practice,
        track_name: Some("Test Ring".to_string()),
        track_length_m: TEST_TRACK_LENGTH_M,
        sector_boundaries_m: Vec::new(),
    }
}

/// A moving, full-throttle reading.
pub fn raw_sample(
    vehicle: u32,
    control: ControlSource,
    lap: u32,
    distance_m: f64,
    elapsed_s: f64,
) -> RawSample {
    RawSample {
        identity: VehicleIdentity::new(vehicle, format!("Driver {}", vehicle)),
        control,
        lap_number: lap,
        lap_distance_m: distance_m,
        time_into_lap_s: elapsed_s,
        speed_ms: 56.8,
        engine_rpm: 7500.0,
        throttle: 1.0,
        brake: 0.0,
        steering: 0.0,
        gear: 5,
        ..Default::default()
    }
}

/// Builds the readings for one lap at constant pace.
///
/// Sample `i` of `n` sits at `i/n` of the track and of the lap time, so the
/// first sample is on the line and the last is just short of it.
#[derive(Debug, Clone)]
pub struct LapBuilder {
    vehicle: u32,
    control: ControlSource,
    lap: u32,
    samples: usize,
    lap_time_s: f64,
    track_length_m: f64,
    previous_lap_time_s: Option<f64>,
    start_fraction: f64,
}

impl LapBuilder {
    pub fn new(vehicle: u32, control: ControlSource) -> Self {
        Self {
            vehicle,
            control,
            lap: 1,
            samples: 450,
            lap_time_s: 95.0,
            track_length_m: TEST_TRACK_LENGTH_M,
            previous_lap_time_s: None,
            start_fraction: 0.0,
        }
    }

    pub fn lap(mut self, lap: u32) -> Self {
        self.lap = lap;
        self
    }

    pub fn samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn lap_time(mut self, lap_time_s: f64) -> Self {
        self.lap_time_s = lap_time_s;
        self
    }

    pub fn track_length(mut self, track_length_m: f64) -> Self {
        self.track_length_m = track_length_m;
        self
    }

    /// Value of the reported last-lap channel on every reading of this lap.
    pub fn previous_lap_time(mut self, previous: Option<f64>) -> Self {
        self.previous_lap_time_s = previous;
        self
    }

    /// Start part-way round the lap, as a fraction of the track.
    pub fn starting_at(mut self, fraction: f64) -> Self {
        self.start_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn build(&self) -> Vec<RawSample> {
        let n = self.samples.max(1) as f64;
        let speed_ms = self.track_length_m / self.lap_time_s.max(f64::EPSILON);
        (0..self.samples)
            .map(|i| {
                let progress = self.start_fraction + (1.0 - self.start_fraction) * (i as f64 / n);
                let mut sample = raw_sample(
                    self.vehicle,
                    self.control,
                    self.lap,
                    self.track_length_m * progress,
                    self.lap_time_s * progress,
                );
                sample.speed_ms = speed_ms;
                sample.last_lap_time_s = self.previous_lap_time_s;
                sample
            })
            .collect()
    }
}

/// Sink that records every lap it is given.
///
/// Clones share the same record, so a test can hand one clone to the capture
/// loop and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<LapEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LapEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn local_laps(&self) -> Vec<Arc<CompletedLap>> {
        self.laps_from(LapOrigin::Local)
    }

    pub fn opponent_laps(&self) -> Vec<Arc<CompletedLap>> {
        self.laps_from(LapOrigin::Opponent)
    }

    fn laps_from(&self, origin: LapOrigin) -> Vec<Arc<CompletedLap>> {
        self.events().into_iter().filter(|e| e.origin == origin).map(|e| e.lap).collect()
    }

    fn push(&self, origin: LapOrigin, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        let mut events =
            self.events.lock().map_err(|_| anyhow::anyhow!("collecting sink poisoned"))?;
        events.push(LapEvent { origin, lap });
        Ok(())
    }
}

impl LapSink for CollectingSink {
    fn name(&self) -> &str {
        "collecting"
    }

    fn on_local_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        self.push(LapOrigin::Local, lap)
    }

    fn on_opponent_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        self.push(LapOrigin::Opponent, lap)
    }
}

/// Sink that rejects every lap.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl LapSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn on_local_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        anyhow::bail!("disk full while writing lap {}", lap.lap_number)
    }

    fn on_opponent_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        anyhow::bail!("disk full while writing lap {}", lap.lap_number)
    }
}

/// Process list that can be switched on and off from a test.
#[derive(Debug, Clone)]
pub struct SimulatedProcess {
    name: String,
    running: Arc<AtomicBool>,
}

impl SimulatedProcess {
    pub fn running(name: impl Into<String>) -> Self {
        Self { name: name.into(), running: Arc::new(AtomicBool::new(true)) }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// An enumerator reporting this process while it is running.
    pub fn enumerator(&self) -> impl FnMut() -> Result<Vec<String>> + Send + 'static + use<> {
        let process = self.clone();
        move || {
            if process.running.load(Ordering::SeqCst) {
                Ok(vec!["explorer.exe".to_string(), process.name.clone()])
            } else {
                Ok(vec!["explorer.exe".to_string()])
            }
        }
    }
}
