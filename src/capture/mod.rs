//! The capture loop
//!
//! [`CaptureLoop::run_once`] is one tick: presence, source availability,
//! session metadata, opponents, then the local driver, then lap dispatch.
//! Nothing raised while handling a single vehicle leaves the tick; failures
//! come back as [`TickDiagnostic`]s on the returned [`LoopStatus`].
//!
//! ```rust,no_run
//! use laplogger::sources::ReplaySource;
//! use laplogger::{CaptureConfig, CaptureLoop, ChannelSink, SystemProcessEnumerator};
//!
//! # async fn run() -> laplogger::Result<()> {
//! let source = ReplaySource::load("session.yaml")?;
//! let (sink, mut laps) = ChannelSink::new();
//!
//! let mut capture =
//!     CaptureLoop::new(CaptureConfig::default(), source, SystemProcessEnumerator::new())?
//!         .with_sink(sink);
//! capture.start();
//!
//! let status = capture.run_once().await;
//! println!("lap {:?}, {} samples", status.current_lap, status.samples_buffered);
//! while let Ok(event) = laps.try_recv() {
//!     println!("{:?}", event.lap.summary());
//! }
//! # Ok(())
//! # }
//! ```

mod status;

#[cfg(test)]
mod tests;

pub use status::{LoopStatus, TickDiagnostic};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::CaptureConfig;
use crate::normalizer::{SampleNormalizer, boundaries_from_crossings};
use crate::opponents::OpponentTracker;
use crate::presence::{PresenceMonitor, ProcessEnumerator};
use crate::segmenter::{LapSegmenter, SegmenterState};
use crate::sink::{LapOrigin, LapSink};
use crate::source::SampleSource;
use crate::types::{CompletedLap, RawSample, SessionId, SessionMetadata, TrackGeometry, VehicleId};
use crate::{CaptureError, Result};
use status::StateKey;

/// Diagnostics and lap count collected during one tick.
#[derive(Default)]
struct TickOutcome {
    diagnostics: Vec<TickDiagnostic>,
    laps_emitted: usize,
}

impl TickOutcome {
    fn record(&mut self, vehicle: Option<VehicleId>, error: &CaptureError) {
        self.diagnostics.push(TickDiagnostic::new(vehicle, error));
    }
}

/// Run a source call under the configured timeout.
async fn timed<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(CaptureError::timeout(operation, limit)))
}

/// Top-level driver of presence, segmentation and lap dispatch.
pub struct CaptureLoop<S, E> {
    config: CaptureConfig,
    source: S,
    presence: PresenceMonitor<E>,
    normalizer: SampleNormalizer,
    local: Option<LapSegmenter>,
    opponents: OpponentTracker,
    sinks: Vec<Box<dyn LapSink>>,

    session_id: Option<SessionId>,
    /// Sector ends learned from the local driver's first valid lap
    learned_boundaries: Option<Vec<f64>>,

    running: bool,
    paused: bool,
    process_detected: bool,
    source_available: bool,

    clock_origin: Option<Instant>,
    ticks: u64,
    laps_emitted: u64,
    last_state: Option<StateKey>,
}

impl<S, E> CaptureLoop<S, E>
where
    S: SampleSource,
    E: ProcessEnumerator,
{
    /// Build a stopped loop. Fails if `config` does not validate.
    pub fn new(config: CaptureConfig, source: S, enumerator: E) -> Result<Self> {
        config.validate()?;
        let presence = PresenceMonitor::new(enumerator, &config.target_process, &config.presence);
        let normalizer = SampleNormalizer::new(&config.normalizer);
        let opponents = OpponentTracker::new(config.opponents.clone(), config.segmenter.clone());

        Ok(Self {
            config,
            source,
            presence,
            normalizer,
            local: None,
            opponents,
            sinks: Vec::new(),
            session_id: None,
            learned_boundaries: None,
            running: false,
            paused: false,
            process_detected: false,
            source_available: false,
            clock_origin: None,
            ticks: 0,
            laps_emitted: 0,
            last_state: None,
        })
    }

    pub fn with_sink(mut self, sink: impl LapSink) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn LapSink>) {
        debug!(sink = sink.name(), "Lap sink registered");
        self.sinks.push(sink);
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn local_segmenter(&self) -> Option<&LapSegmenter> {
        self.local.as_ref()
    }

    pub fn opponents(&self) -> &OpponentTracker {
        &self.opponents
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Sector boundaries learned this session, if any.
    pub fn learned_boundaries(&self) -> Option<&[f64]> {
        self.learned_boundaries.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn start(&mut self) {
        if !self.running {
            info!(target_process = %self.config.target_process, "Capture loop started");
            self.running = true;
        }
    }

    /// Stop ticking. Buffered laps are kept and continue after a later `start`.
    pub fn stop(&mut self) {
        if self.running {
            info!(ticks = self.ticks, laps = self.laps_emitted, "Capture loop stopped");
            self.running = false;
        }
    }

    /// Keep polling presence but stop reading the source.
    pub fn pause(&mut self) {
        if !self.paused {
            info!("Capture paused");
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            info!("Capture resumed");
            self.paused = false;
        }
    }

    /// One tick, timed by a clock that starts at the first call.
    pub async fn run_once(&mut self) -> LoopStatus {
        let origin = *self.clock_origin.get_or_insert_with(Instant::now);
        self.run_once_at(origin.elapsed()).await
    }

    /// One tick at an explicit loop time.
    ///
    /// `now` drives presence rate limiting, inactivity timeouts and opponent
    /// expiry. It must not go backwards between calls.
    pub async fn run_once_at(&mut self, now: Duration) -> LoopStatus {
        let mut outcome = TickOutcome::default();
        if self.running {
            self.ticks += 1;
            self.tick(now, &mut outcome).await;
        }
        self.snapshot(outcome)
    }

    async fn tick(&mut self, now: Duration, outcome: &mut TickOutcome) {
        self.process_detected = self.presence.poll(now).is_present();
        if !self.process_detected {
            self.source_available = false;
            return;
        }
        if self.paused {
            return;
        }

        let limit = self.config.source_timeout();
        let source = &mut self.source;
        let available = timed(limit, "is_available", async move { Ok(source.is_available().await) })
            .await
            .unwrap_or_else(|e| {
                outcome.record(None, &e);
                false
            });
        if !available {
            self.on_source_lost(outcome);
            return;
        }

        let metadata = match timed(limit, "read_session_metadata", self.source.read_session_metadata())
            .await
        {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "Session metadata unavailable");
                outcome.record(None, &e);
                self.on_source_lost(outcome);
                return;
            }
        };
        if !self.source_available {
            info!("Telemetry source available");
            self.source_available = true;
        }

        if let Some(session) = metadata.recognized_session_id() {
            if self.session_id.as_ref() != Some(session) {
                self.begin_session(session.clone(), &metadata);
            }
        }
        let session = metadata.recognized_session_id().cloned();
        let track = self.geometry(&metadata);

        let mut opponent_laps = Vec::new();
        if self.config.opponents.track_opponents {
            match timed(limit, "read_all_vehicles", self.source.read_all_vehicles()).await {
                Ok(vehicles) => {
                    let advanced = self.opponents.advance(
                        session.as_ref(),
                        &vehicles,
                        &self.normalizer,
                        &track,
                        now,
                    );
                    for (vehicle, error) in &advanced.failures {
                        outcome.record(Some(*vehicle), error);
                    }
                    opponent_laps = advanced.laps;
                }
                Err(e) => {
                    warn!(error = %e, "Vehicle list unavailable, opponents skipped this tick");
                    outcome.record(None, &e);
                }
            }
        }

        let mut local_laps = Vec::new();
        match timed(limit, "read_local_vehicle", self.source.read_local_vehicle()).await {
            Ok(Some(raw)) => {
                local_laps = self.advance_local(session.as_ref(), &raw, &track, &metadata, now, outcome)
            }
            Ok(None) => trace!("No local vehicle this tick"),
            Err(e) => {
                warn!(error = %e, "Local vehicle unavailable");
                outcome.record(None, &e);
            }
        }

        for lap in opponent_laps {
            self.dispatch(LapOrigin::Opponent, lap, outcome);
        }
        for lap in local_laps {
            self.dispatch(LapOrigin::Local, lap, outcome);
        }
    }

    fn advance_local(
        &mut self,
        session: Option<&SessionId>,
        raw: &RawSample,
        track: &TrackGeometry,
        metadata: &SessionMetadata,
        now: Duration,
        outcome: &mut TickOutcome,
    ) -> Vec<CompletedLap> {
        let mut laps = Vec::new();
        let vehicle = raw.vehicle_id();

        let sample = match self.normalizer.normalize(raw, track) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(vehicle = %vehicle, error = %e, "Local reading skipped");
                outcome.record(Some(vehicle), &e);
                return laps;
            }
        };

        if self.local.as_ref().is_some_and(|s| s.vehicle() != vehicle) {
            info!(vehicle = %vehicle, "Local vehicle changed");
            if let Some(lap) = self.local.take().and_then(|mut previous| previous.source_lost()) {
                laps.push(lap);
            }
        }
        let config = &self.config.segmenter;
        let segmenter = self.local.get_or_insert_with(|| LapSegmenter::new(vehicle, config.clone()));

        if let Some(lap) = segmenter.observe(session, raw, sample, now) {
            self.learn_geometry(&lap, metadata);
            laps.push(lap);
        }
        laps
    }

    /// Adopt sector boundaries from the first valid local lap that reported splits.
    fn learn_geometry(&mut self, lap: &CompletedLap, metadata: &SessionMetadata) {
        if self.learned_boundaries.is_some()
            || !metadata.sector_boundaries_m.is_empty()
            || !lap.completed()
            || lap.sector_crossings_m.is_empty()
        {
            return;
        }
        let Some(length) = metadata.geometry().known_length() else { return };

        let (boundaries, count) = boundaries_from_crossings(
            &lap.sector_crossings_m,
            length,
            self.normalizer.sector_count(),
        );
        info!(lap = lap.lap_number, sectors = count, ?boundaries, "Learned sector boundaries");
        self.learned_boundaries = Some(boundaries);
    }

    fn geometry(&self, metadata: &SessionMetadata) -> TrackGeometry {
        let mut geometry = metadata.geometry();
        if geometry.sector_boundaries_m.is_empty() {
            if let Some(learned) = &self.learned_boundaries {
                geometry.sector_boundaries_m = learned.clone();
            }
        }
        geometry
    }

    fn begin_session(&mut self, session: SessionId, metadata: &SessionMetadata) {
        info!(
            session = %session,
            session_type = ?metadata.session_type,
            track = metadata.track_name.as_deref().unwrap_or("unknown"),
            track_length_m = metadata.track_length_m,
            "Session detected"
        );
        if let Some(local) = self.local.as_mut() {
            local.reset();
        }
        self.opponents.reset();
        self.learned_boundaries = None;
        self.session_id = Some(session);
    }

    fn on_source_lost(&mut self, outcome: &mut TickOutcome) {
        if self.source_available {
            info!("Telemetry source lost");
        }
        self.source_available = false;

        if let Some(lap) = self.local.as_mut().and_then(|local| local.source_lost()) {
            self.dispatch(LapOrigin::Local, lap, outcome);
        }
    }

    fn dispatch(&mut self, origin: LapOrigin, lap: CompletedLap, outcome: &mut TickOutcome) {
        let lap = Arc::new(lap);
        debug!(
            ?origin,
            vehicle = %lap.identity.id,
            lap = lap.lap_number,
            sinks = self.sinks.len(),
            "Dispatching lap"
        );

        for sink in self.sinks.iter_mut() {
            let delivered = match origin {
                LapOrigin::Local => sink.on_local_lap_complete(Arc::clone(&lap)),
                LapOrigin::Opponent => sink.on_opponent_lap_complete(Arc::clone(&lap)),
            };
            if let Err(e) = delivered {
                let error = CaptureError::handler(sink.name(), e);
                warn!(vehicle = %lap.identity.id, lap = lap.lap_number, error = %error, "Lap sink failed");
                outcome.record(Some(lap.identity.id), &error);
            }
        }

        outcome.laps_emitted += 1;
        self.laps_emitted += 1;
    }

    fn snapshot(&mut self, outcome: TickOutcome) -> LoopStatus {
        let local = self.local.as_ref();
        let mut status = LoopStatus {
            tick: self.ticks,
            running: self.running,
            paused: self.paused,
            process_detected: self.process_detected,
            source_available: self.source_available,
            session_id: self.session_id.clone(),
            local_state: local.map_or(SegmenterState::Idle, |s| s.state()),
            current_lap: local.and_then(|s| s.current_lap()),
            samples_buffered: local.map_or(0, |s| s.samples_buffered()),
            opponents_tracked: self.opponents.tracked_count(),
            laps_emitted: outcome.laps_emitted,
            total_laps_emitted: self.laps_emitted,
            state_changed: false,
            diagnostics: outcome.diagnostics,
        };

        let key = status.state_key();
        status.state_changed = self.last_state.as_ref() != Some(&key);
        self.last_state = Some(key);
        status
    }
}
