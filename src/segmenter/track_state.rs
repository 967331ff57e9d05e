//! In-progress lap state for one vehicle

use std::time::Duration;
use tracing::trace;

use crate::normalizer::{SectorCrossingTracker, SectorObservation};
use crate::types::{ControlSource, NormalizedSample, RawSample, VehicleIdentity};

/// Everything a segmenter remembers about the lap a vehicle is currently on.
///
/// Created when buffering starts and consumed when the lap is finalized,
/// so a lap's samples can never leak into the next one.
#[derive(Debug, Clone)]
pub struct VehicleTrackState {
    identity: VehicleIdentity,
    control: ControlSource,
    lap_number: u32,
    samples: Vec<NormalizedSample>,
    lap_started_at: Duration,
    last_activity_at: Duration,
    last_lap_distance_m: f64,
    sectors: SectorCrossingTracker,
}

impl VehicleTrackState {
    pub(crate) fn begin(raw: &RawSample, sample: NormalizedSample, now: Duration) -> Self {
        let mut state = Self {
            identity: raw.identity.clone(),
            control: raw.control,
            lap_number: raw.lap_number,
            samples: Vec::with_capacity(1024),
            lap_started_at: now,
            last_activity_at: now,
            last_lap_distance_m: sample.lap_distance_m,
            sectors: SectorCrossingTracker::default(),
        };
        state.record(raw, sample, now, true);
        state
    }

    /// Track the latest identity; names and positions change during a session.
    pub(crate) fn refresh_identity(&mut self, raw: &RawSample) {
        if self.identity != raw.identity {
            self.identity = raw.identity.clone();
        }
        self.control = raw.control;
    }

    /// Append a sample to the lap buffer.
    ///
    /// Repeated readings and readings whose elapsed time went backwards are not
    /// buffered. Returns whether the sample was appended.
    pub(crate) fn record(
        &mut self,
        raw: &RawSample,
        sample: NormalizedSample,
        now: Duration,
        active: bool,
    ) -> bool {
        if active {
            self.last_activity_at = now;
        }
        self.last_lap_distance_m = sample.lap_distance_m;
        self.sectors.observe(SectorObservation::from(raw));

        if let Some(last) = self.samples.last() {
            if sample.is_repeat_of(last) {
                trace!(vehicle = %self.identity.id, elapsed = sample.elapsed_s, "Stale sample skipped");
                return false;
            }
            if sample.elapsed_s < last.elapsed_s {
                trace!(
                    vehicle = %self.identity.id,
                    elapsed = sample.elapsed_s,
                    previous = last.elapsed_s,
                    "Out-of-order sample skipped"
                );
                return false;
            }
        }

        self.samples.push(sample);
        true
    }

    pub fn identity(&self) -> &VehicleIdentity {
        &self.identity
    }

    pub fn control(&self) -> ControlSource {
        self.control
    }

    pub fn lap_number(&self) -> u32 {
        self.lap_number
    }

    pub fn samples(&self) -> &[NormalizedSample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// When buffering for this lap started, on the loop clock.
    pub fn lap_started_at(&self) -> Duration {
        self.lap_started_at
    }

    pub fn last_activity_at(&self) -> Duration {
        self.last_activity_at
    }

    pub fn last_lap_distance_m(&self) -> f64 {
        self.last_lap_distance_m
    }

    /// Lap distance of the first buffered sample.
    pub fn first_lap_distance_m(&self) -> Option<f64> {
        self.samples.first().map(|s| s.lap_distance_m)
    }

    /// Elapsed lap time of the last buffered sample.
    pub fn last_elapsed_s(&self) -> f64 {
        self.samples.last().map(|s| s.elapsed_s).unwrap_or(0.0)
    }

    pub fn sector_crossings(&self) -> Vec<f64> {
        self.sectors.crossings()
    }

    pub(crate) fn into_parts(self) -> (VehicleIdentity, ControlSource, Vec<NormalizedSample>) {
        (self.identity, self.control, self.samples)
    }
}
