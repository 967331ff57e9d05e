//! Per-vehicle lap state machine
//!
//! A [`LapSegmenter`] turns one vehicle's sample stream into discrete
//! [`CompletedLap`]s. The same machine serves the local driver and every
//! tracked opponent.
//!
//! ```text
//! Idle ──session──▶ Detected ──moving──▶ Logging ──lap++──▶ Logging
//!                                          │  ▲
//!                              inactivity  │  │ moving
//!                              teleport    ▼  │
//!                                        Suspended
//!
//! any ──source lost──▶ Idle
//! ```
//!
//! Each Logging tick checks, in order: lap-number increase (an increase of more
//! than one closes the lap as `source_lost`), then the discard
//! conditions (pit or garage, teleport, inactivity timeout), then appends the
//! sample. A lap that completes on the same tick the car comes to rest is
//! therefore recorded as valid.

mod track_state;


pub use track_state::VehicleTrackState;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::SegmenterConfig;
use crate::types::{
    CompletedLap, DiscardReason, LapTimeSource, NormalizedSample, RawSample, SessionId, VehicleId,
};

/// Segmenter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterState {
    /// No session observed
    #[default]
    Idle,
    /// Session known, vehicle not yet moving
    Detected,
    /// Buffering the current lap
    Logging,
    /// Lap abandoned, waiting for renewed forward activity
    Suspended,
}

/// Lap state machine for one vehicle.
#[derive(Debug, Clone)]
pub struct LapSegmenter {
    vehicle: VehicleId,
    config: SegmenterConfig,
    state: SegmenterState,
    session_id: Option<SessionId>,
    track: Option<VehicleTrackState>,
    emitted_laps: BTreeSet<u32>,
}

impl LapSegmenter {
    pub fn new(vehicle: VehicleId, config: SegmenterConfig) -> Self {
        Self {
            vehicle,
            config,
            state: SegmenterState::Idle,
            session_id: None,
            track: None,
            emitted_laps: BTreeSet::new(),
        }
    }

    pub fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// The in-progress lap, if buffering.
    pub fn track_state(&self) -> Option<&VehicleTrackState> {
        self.track.as_ref()
    }

    pub fn current_lap(&self) -> Option<u32> {
        self.track.as_ref().map(|t| t.lap_number())
    }

    pub fn samples_buffered(&self) -> usize {
        self.track.as_ref().map_or(0, |t| t.sample_count())
    }

    /// Whether a lap with this number was already handed out this session.
    pub fn has_emitted(&self, lap_number: u32) -> bool {
        self.emitted_laps.contains(&lap_number)
    }

    /// Feed one tick's reading.
    ///
    /// `raw` supplies lap number, reported lap time, pit flags and sector splits;
    /// `sample` is its normalized form. `now` is the loop clock and only drives
    /// the inactivity timeout. Readings without a recognized session id are ignored.
    pub fn observe(
        &mut self,
        session: Option<&SessionId>,
        raw: &RawSample,
        sample: NormalizedSample,
        now: Duration,
    ) -> Option<CompletedLap> {
        let Some(session) = session else {
            trace!(vehicle = %self.vehicle, "Reading without session id ignored");
            return None;
        };
        self.enter_session(session);

        match self.state {
            SegmenterState::Logging => self.advance_logging(raw, sample, now),
            SegmenterState::Idle | SegmenterState::Detected | SegmenterState::Suspended => {
                if self.is_moving(raw, &sample) {
                    self.begin_lap(raw, sample, now);
                }
                None
            }
        }
    }

    /// The sample source went away.
    ///
    /// A buffered lap is finalized as incomplete with reason `source_lost` and
    /// the machine drops to `Idle`. The session and the set of emitted laps are
    /// kept, so a reconnect within the same session cannot re-emit a lap.
    pub fn source_lost(&mut self) -> Option<CompletedLap> {
        let lap = match self.track.take() {
            Some(track) if self.state == SegmenterState::Logging => {
                self.finalize(track, None, Some(DiscardReason::SourceLost))
            }
            _ => None,
        };
        if self.state != SegmenterState::Idle {
            debug!(vehicle = %self.vehicle, from = ?self.state, "Source lost, segmenter idle");
        }
        self.state = SegmenterState::Idle;
        lap
    }

    /// Forget everything, including the session. Buffered samples are dropped.
    pub fn reset(&mut self) {
        if let Some(track) = self.track.take() {
            debug!(
                vehicle = %self.vehicle,
                lap = track.lap_number(),
                dropped = track.sample_count(),
                "Dropping partial lap on reset"
            );
        }
        self.state = SegmenterState::Idle;
        self.session_id = None;
        self.emitted_laps.clear();
    }

    fn enter_session(&mut self, session: &SessionId) {
        if self.session_id.as_ref() == Some(session) {
            if self.state == SegmenterState::Idle {
                debug!(vehicle = %self.vehicle, session = %session, "Segmenter detected session");
                self.state = SegmenterState::Detected;
            }
            return;
        }

        if let Some(previous) = &self.session_id {
            info!(vehicle = %self.vehicle, from = %previous, to = %session, "Session changed");
        }
        self.reset();
        self.session_id = Some(session.clone());
        self.state = SegmenterState::Detected;
    }

    fn begin_lap(&mut self, raw: &RawSample, sample: NormalizedSample, now: Duration) {
        debug!(
            vehicle = %self.vehicle,
            lap = raw.lap_number,
            distance = sample.lap_distance_m,
            from = ?self.state,
            "Lap buffering started"
        );
        self.track = Some(VehicleTrackState::begin(raw, sample, now));
        self.state = SegmenterState::Logging;
    }

    fn advance_logging(
        &mut self,
        raw: &RawSample,
        sample: NormalizedSample,
        now: Duration,
    ) -> Option<CompletedLap> {
        let Some(mut track) = self.track.take() else {
            self.state = SegmenterState::Detected;
            return None;
        };
        track.refresh_identity(raw);

        if raw.lap_number > track.lap_number() {
            // A skipped lap number means readings were missed and the reported
            // last lap time belongs to a later lap.
            let lap = if raw.lap_number == track.lap_number() + 1 {
                self.finalize(track, raw.reported_last_lap_time(), None)
            } else {
                debug!(
                    vehicle = %self.vehicle,
                    lap = track.lap_number(),
                    next = raw.lap_number,
                    "Lap numbers skipped, closing lap as partial"
                );
                self.finalize(track, None, Some(DiscardReason::SourceLost))
            };
            self.begin_lap(raw, sample, now);
            return lap;
        }

        if let Some(reason) = self.discard_condition(&track, raw, &sample, now) {
            debug!(vehicle = %self.vehicle, lap = track.lap_number(), %reason, "Lap abandoned");
            self.state = SegmenterState::Suspended;
            return self.finalize(track, None, Some(reason));
        }

        let active = self.is_active(&sample);
        track.record(raw, sample, now, active);
        self.track = Some(track);
        None
    }

    fn discard_condition(
        &self,
        track: &VehicleTrackState,
        raw: &RawSample,
        sample: &NormalizedSample,
        now: Duration,
    ) -> Option<DiscardReason> {
        if raw.in_pit_or_garage() {
            return Some(DiscardReason::Inactivity);
        }
        if raw.lap_number < track.lap_number() {
            return Some(DiscardReason::Teleport);
        }
        if sample.lap_distance_m + self.config.lap_reset_tolerance_m < track.last_lap_distance_m() {
            return Some(DiscardReason::Teleport);
        }
        if !self.is_active(sample)
            && now.saturating_sub(track.last_activity_at()) >= self.config.inactivity_timeout()
        {
            return Some(DiscardReason::Inactivity);
        }
        None
    }

    fn finalize(
        &mut self,
        track: VehicleTrackState,
        reported_lap_time: Option<f64>,
        discard: Option<DiscardReason>,
    ) -> Option<CompletedLap> {
        let lap_number = track.lap_number();
        if track.is_empty() {
            return None;
        }
        if self.emitted_laps.contains(&lap_number) {
            debug!(vehicle = %self.vehicle, lap = lap_number, "Lap already emitted, suppressed");
            return None;
        }

        let (lap_time_s, lap_time_source) = match reported_lap_time {
            Some(time) => (time, LapTimeSource::Reported),
            None => (track.last_elapsed_s(), LapTimeSource::Buffered),
        };
        let discard_reason = discard.or_else(|| self.quality_check(&track, lap_time_s));
        let sector_crossings_m = track.sector_crossings();
        let (identity, control, samples) = track.into_parts();

        self.emitted_laps.insert(lap_number);

        let lap = CompletedLap {
            identity,
            control,
            session_id: self.session_id.clone(),
            lap_number,
            lap_time_s,
            lap_time_source,
            samples,
            discard_reason,
            sector_crossings_m,
            is_fastest: false,
        };

        info!(
            vehicle = %self.vehicle,
            lap = lap_number,
            lap_time = lap_time_s,
            samples = lap.samples.len(),
            completed = lap.completed(),
            reason = lap.discard_reason.map(DiscardReason::as_str),
            "Lap finalized"
        );
        Some(lap)
    }

    fn quality_check(&self, track: &VehicleTrackState, lap_time_s: f64) -> Option<DiscardReason> {
        let joined_late = track
            .first_lap_distance_m()
            .is_some_and(|d| d > self.config.lap_start_tolerance_m);
        if joined_late {
            return Some(DiscardReason::JoinedMidLap);
        }
        if track.sample_count() < self.config.min_lap_samples
            || lap_time_s < self.config.min_lap_time_s
        {
            return Some(DiscardReason::TooShort);
        }
        None
    }

    /// Moving purposefully: out of the pits and above the speed floor.
    fn is_moving(&self, raw: &RawSample, sample: &NormalizedSample) -> bool {
        !raw.in_pit_or_garage() && sample.speed_kmh >= self.config.min_speed_kmh
    }

    fn is_active(&self, sample: &NormalizedSample) -> bool {
        sample.speed_kmh >= self.config.min_speed_kmh
            || sample.throttle_pct >= self.config.min_throttle_pct
    }
}
