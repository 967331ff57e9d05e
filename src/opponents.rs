//! Opponent lap tracking
//!
//! [`OpponentTracker`] owns one [`LapSegmenter`] per eligible remote vehicle,
//! keyed by vehicle id. It never looks at the local driver's segmenter, so
//! opponents keep being segmented while the local driver is idle, suspended or
//! in the garage.
//!
//! Finished laps pass through the retention policy before they leave the
//! tracker. Under [`RetentionPolicy::FastestLapOnly`] an opponent's first
//! completed lap is emitted and after that only laps that beat it. Laps already
//! handed out are never retracted.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{OpponentConfig, RetentionPolicy, SegmenterConfig};
use crate::normalizer::SampleNormalizer;
use crate::segmenter::{LapSegmenter, SegmenterState};
use crate::types::{
    CompletedLap, ControlSource, LapTimeSource, RawSample, SessionId, TrackGeometry, VehicleId,
};
use crate::CaptureError;

/// What the tracker remembers about one opponent for the whole session.
///
/// Survives the opponent dropping out of the vehicle list, so a reconnecting
/// opponent cannot get the same lap emitted twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpponentRetentionEntry {
    /// Fastest reported lap time emitted so far
    pub best_lap_time_s: Option<f64>,
    pub best_lap_number: Option<u32>,
    /// Lap numbers that already went through the retention decision
    pub settled_laps: BTreeSet<u32>,
    pub laps_emitted: u32,
}

impl OpponentRetentionEntry {
    /// Whether a lap with this number was already considered.
    pub fn has_settled(&self, lap_number: u32) -> bool {
        self.settled_laps.contains(&lap_number)
    }
}

/// Laps and per-vehicle failures from one tracker advance.
#[derive(Debug, Default)]
pub struct OpponentTick {
    /// Retained laps in emission order
    pub laps: Vec<CompletedLap>,
    pub failures: Vec<(VehicleId, CaptureError)>,
}

struct TrackedOpponent {
    segmenter: LapSegmenter,
    last_seen: Duration,
}

/// Runs one lap segmenter per eligible opponent.
pub struct OpponentTracker {
    config: OpponentConfig,
    segmenter_config: SegmenterConfig,
    session_id: Option<SessionId>,
    vehicles: HashMap<VehicleId, TrackedOpponent>,
    retention: HashMap<VehicleId, OpponentRetentionEntry>,
}

impl OpponentTracker {
    pub fn new(config: OpponentConfig, segmenter_config: SegmenterConfig) -> Self {
        Self {
            config,
            segmenter_config,
            session_id: None,
            vehicles: HashMap::new(),
            retention: HashMap::new(),
        }
    }

    /// Whether a vehicle with this control source is segmented.
    ///
    /// Remote humans always are, AI only with `track_ai`. The local driver,
    /// replays and empty slots never are.
    pub fn is_eligible(&self, control: ControlSource) -> bool {
        match control {
            ControlSource::RemoteHuman => true,
            ControlSource::Ai => self.config.track_ai,
            ControlSource::LocalHuman | ControlSource::Replay | ControlSource::Nobody => false,
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_tracking(&self, vehicle: VehicleId) -> bool {
        self.vehicles.contains_key(&vehicle)
    }

    pub fn segmenter_state(&self, vehicle: VehicleId) -> Option<SegmenterState> {
        self.vehicles.get(&vehicle).map(|t| t.segmenter.state())
    }

    pub fn retention_entry(&self, vehicle: VehicleId) -> Option<&OpponentRetentionEntry> {
        self.retention.get(&vehicle)
    }

    /// Drop every segmenter and retention entry.
    pub fn reset(&mut self) {
        if !self.vehicles.is_empty() || !self.retention.is_empty() {
            debug!(tracked = self.vehicles.len(), "Opponent tracker reset");
        }
        self.vehicles.clear();
        self.retention.clear();
        self.session_id = None;
    }

    /// Feed one tick's vehicle list.
    ///
    /// Vehicles are processed in the order given. A reading that fails
    /// normalization skips that vehicle for this tick and is reported in
    /// [`OpponentTick::failures`]; the other vehicles proceed.
    pub fn advance(
        &mut self,
        session: Option<&SessionId>,
        vehicles: &[RawSample],
        normalizer: &SampleNormalizer,
        track: &TrackGeometry,
        now: Duration,
    ) -> OpponentTick {
        let mut tick = OpponentTick::default();
        if !self.config.track_opponents {
            if !self.vehicles.is_empty() {
                self.reset();
            }
            return tick;
        }

        if let Some(session) = session {
            if self.session_id.as_ref() != Some(session) {
                if self.session_id.is_some() {
                    info!(session = %session, "New session, opponent state cleared");
                }
                self.reset();
                self.session_id = Some(session.clone());
            }
        }

        for raw in vehicles {
            if !self.is_eligible(raw.control) {
                continue;
            }
            let id = raw.vehicle_id();
            let sample = match normalizer.normalize(raw, track) {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(vehicle = %id, error = %e, "Opponent reading skipped");
                    tick.failures.push((id, e));
                    continue;
                }
            };

            let segmenter_config = &self.segmenter_config;
            let tracked = self.vehicles.entry(id).or_insert_with(|| {
                debug!(vehicle = %id, driver = %raw.identity.driver_name, "Tracking opponent");
                TrackedOpponent {
                    segmenter: LapSegmenter::new(id, segmenter_config.clone()),
                    last_seen: now,
                }
            });
            tracked.last_seen = now;
            let finished = tracked.segmenter.observe(session, raw, sample, now);

            if let Some(lap) = finished.and_then(|lap| self.retain(lap)) {
                tick.laps.push(lap);
            }
        }

        self.expire_missing(now, &mut tick);
        tick
    }

    /// Drop opponents not seen for longer than the vehicle timeout.
    fn expire_missing(&mut self, now: Duration, tick: &mut OpponentTick) {
        let timeout = self.config.vehicle_timeout();
        let mut expired: Vec<VehicleId> = self
            .vehicles
            .iter()
            .filter(|(_, t)| now.saturating_sub(t.last_seen) > timeout)
            .map(|(id, _)| *id)
            .collect();
        expired.sort();

        for id in expired {
            let Some(mut tracked) = self.vehicles.remove(&id) else { continue };
            info!(vehicle = %id, "Opponent left, segmenter dropped");
            if let Some(lap) = tracked.segmenter.source_lost().and_then(|lap| self.retain(lap)) {
                tick.laps.push(lap);
            }
        }
    }

    /// Apply the retention policy. Returns the lap if it should be emitted.
    fn retain(&mut self, mut lap: CompletedLap) -> Option<CompletedLap> {
        let vehicle = lap.identity.id;
        let entry = self.retention.entry(vehicle).or_default();

        if !entry.settled_laps.insert(lap.lap_number) {
            debug!(vehicle = %vehicle, lap = lap.lap_number, "Opponent lap already settled");
            return None;
        }

        let competes = lap.completed() && lap.lap_time_source == LapTimeSource::Reported;
        let is_best = competes && entry.best_lap_time_s.is_none_or(|best| lap.lap_time_s < best);

        match self.config.retention {
            RetentionPolicy::FastestLapOnly if !is_best => {
                debug!(
                    vehicle = %vehicle,
                    lap = lap.lap_number,
                    lap_time = lap.lap_time_s,
                    best = entry.best_lap_time_s,
                    completed = lap.completed(),
                    "Opponent lap not retained"
                );
                return None;
            }
            _ => {}
        }

        if is_best {
            entry.best_lap_time_s = Some(lap.lap_time_s);
            entry.best_lap_number = Some(lap.lap_number);
            lap.is_fastest = true;
        }
        entry.laps_emitted += 1;
        Some(lap)
    }
}
