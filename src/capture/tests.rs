use super::*;

use crate::config::{OpponentConfig, PresenceConfig, RetentionPolicy};
use crate::sources::{ReplaySource, ReplayTick};
use crate::test_utils::{
    CollectingSink, FailingSink, LapBuilder, SimulatedProcess, test_metadata,
};
use crate::types::{ControlSource, DiscardReason};
use crate::ErrorKind;

const PROCESS: &str = "Le Mans Ultimate.exe";
const STEP: Duration = Duration::from_millis(10);

fn test_config() -> CaptureConfig {
    CaptureConfig {
        presence: PresenceConfig { check_interval_ms: 0, debounce_polls: 1 },
        opponents: OpponentConfig { retention: RetentionPolicy::AllLaps, ..Default::default() },
        ..Default::default()
    }
}

/// Interleave per-vehicle streams into ticks; stream `i` supplies the i-th vehicle.
fn interleave(streams: Vec<Vec<RawSample>>) -> Vec<ReplayTick> {
    let len = streams.iter().map(Vec::len).max().unwrap_or(0);
    (0..len)
        .map(|i| ReplayTick::new(streams.iter().filter_map(|s| s.get(i).cloned()).collect()))
        .collect()
}

struct Harness {
    capture: CaptureLoop<ReplaySource, Box<dyn FnMut() -> Result<Vec<String>> + Send>>,
    sink: CollectingSink,
    process: SimulatedProcess,
    clock: Duration,
}

impl Harness {
    fn new(config: CaptureConfig, ticks: Vec<ReplayTick>) -> Self {
        let process = SimulatedProcess::running(PROCESS);
        let sink = CollectingSink::new();
        let enumerator: Box<dyn FnMut() -> Result<Vec<String>> + Send> =
            Box::new(process.enumerator());
        let mut capture = CaptureLoop::new(config, ReplaySource::new(test_metadata(), ticks), enumerator)
            .unwrap()
            .with_sink(sink.clone());
        capture.start();
        Self { capture, sink, process, clock: Duration::ZERO }
    }

    async fn step(&mut self) -> LoopStatus {
        let status = self.capture.run_once_at(self.clock).await;
        self.clock += STEP;
        status
    }

    async fn steps(&mut self, n: usize) -> Vec<LoopStatus> {
        let mut statuses = Vec::with_capacity(n);
        for _ in 0..n {
            statuses.push(self.step().await);
        }
        statuses
    }
}

fn local_lap(lap: u32, samples: usize) -> LapBuilder {
    LapBuilder::new(0, ControlSource::LocalHuman).lap(lap).samples(samples)
}

fn opponent_lap(vehicle: u32, lap: u32, samples: usize) -> LapBuilder {
    LapBuilder::new(vehicle, ControlSource::RemoteHuman).lap(lap).samples(samples)
}

#[tokio::test]
async fn local_lap_reaches_sinks_with_reported_time() {
    let mut local = local_lap(2, 450).build();
    local.extend(local_lap(3, 1).previous_lap_time(Some(95.0)).build());
    let mut harness = Harness::new(test_config(), interleave(vec![local]));

    let statuses = harness.steps(451).await;

    let laps = harness.sink.local_laps();
    assert_eq!(laps.len(), 1);
    assert_eq!(laps[0].lap_number, 2);
    assert_eq!(laps[0].sample_count(), 450);
    assert_eq!(laps[0].lap_time_s, 95.0);
    assert!(laps[0].completed());

    let last = statuses.last().unwrap();
    assert_eq!(last.laps_emitted, 1);
    assert_eq!(last.total_laps_emitted, 1);
    assert_eq!(last.current_lap, Some(3));
    assert_eq!(last.local_state, SegmenterState::Logging);
    assert!(last.is_urgent());
    assert!(last.diagnostics.is_empty());
}

#[tokio::test]
async fn opponents_are_segmented_while_local_driver_sits_in_garage() {
    let mut garage = local_lap(1, 120).build();
    for sample in garage.iter_mut() {
        sample.in_garage = true;
        sample.speed_ms = 0.0;
    }
    let mut opponent = opponent_lap(7, 1, 60).lap_time(92.0).build();
    opponent.extend(opponent_lap(7, 2, 60).previous_lap_time(Some(92.0)).build());
    let mut harness = Harness::new(test_config(), interleave(vec![garage, opponent]));

    let statuses = harness.steps(120).await;

    let laps = harness.sink.opponent_laps();
    assert_eq!(laps.len(), 1);
    assert_eq!(laps[0].identity.id, VehicleId(7));
    assert_eq!(laps[0].lap_time_s, 92.0);
    assert!(harness.sink.local_laps().is_empty());
    assert!(statuses.iter().all(|s| s.local_state == SegmenterState::Detected));
    assert_eq!(statuses.last().unwrap().opponents_tracked, 1);
}

#[tokio::test]
async fn absent_process_leaves_source_and_segmenters_alone() {
    let local = local_lap(1, 20).build();
    let mut harness = Harness::new(test_config(), interleave(vec![local]));
    harness.process.set_running(false);

    for status in harness.steps(5).await {
        assert!(!status.process_detected);
        assert!(!status.source_available);
        assert_eq!(status.samples_buffered, 0);
    }
    assert!(harness.capture.session_id().is_none());

    harness.process.set_running(true);
    let status = harness.step().await;
    assert!(status.process_detected);
    assert!(status.state_changed);
    // The replay was not advanced while the process was away.
    assert_eq!(status.samples_buffered, 1);
    assert_eq!(harness.capture.session_id(), test_metadata().session_id.as_ref());
}

#[tokio::test]
async fn source_outage_closes_local_lap_only() {
    let local = local_lap(1, 100).build();
    let opponent = opponent_lap(7, 1, 100).build();
    let mut ticks = interleave(vec![local[..50].to_vec(), opponent[..50].to_vec()]);
    ticks.push(ReplayTick::unavailable());
    ticks.extend(interleave(vec![local[50..].to_vec(), opponent[50..].to_vec()]));
    let mut harness = Harness::new(test_config(), ticks);

    harness.steps(50).await;
    let outage = harness.step().await;

    assert!(!outage.source_available);
    assert_eq!(outage.local_state, SegmenterState::Idle);
    assert_eq!(outage.opponents_tracked, 1);
    let lost = harness.sink.local_laps();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].discard_reason, Some(DiscardReason::SourceLost));
    assert_eq!(lost[0].sample_count(), 50);
    assert!(harness.sink.opponent_laps().is_empty());

    let back = harness.step().await;
    assert!(back.source_available);
    assert_eq!(back.local_state, SegmenterState::Logging);
}

#[tokio::test]
async fn malformed_opponent_is_reported_and_others_proceed() {
    let local = local_lap(1, 3).build();
    let good = opponent_lap(4, 1, 3).build();
    let mut bad = opponent_lap(5, 1, 3).build();
    bad[1].speed_ms = f64::NAN;
    let mut harness = Harness::new(test_config(), interleave(vec![local, bad, good]));

    let statuses = harness.steps(3).await;

    let diagnostics = &statuses[1].diagnostics;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].vehicle, Some(VehicleId(5)));
    assert_eq!(diagnostics[0].kind, ErrorKind::MalformedSample);
    assert!(diagnostics[0].message.contains("speed_ms"));

    let last = statuses.last().unwrap();
    assert_eq!(last.samples_buffered, 3);
    assert_eq!(last.opponents_tracked, 2);
    assert!(last.diagnostics.is_empty());
}

#[tokio::test]
async fn failing_sink_does_not_starve_other_sinks() {
    let mut local = local_lap(1, 20).build();
    local.extend(local_lap(2, 1).previous_lap_time(Some(95.0)).build());
    let mut harness = Harness::new(test_config(), interleave(vec![local]));
    harness.capture.add_sink(Box::new(FailingSink));
    let second = CollectingSink::new();
    harness.capture.add_sink(Box::new(second.clone()));

    let statuses = harness.steps(21).await;

    let last = statuses.last().unwrap();
    assert_eq!(last.diagnostics.len(), 1);
    assert_eq!(last.diagnostics[0].kind, ErrorKind::Handler);
    assert_eq!(last.diagnostics[0].vehicle, Some(VehicleId(0)));
    assert!(last.diagnostics[0].message.contains("failing"));
    assert_eq!(harness.sink.local_laps().len(), 1);
    assert_eq!(second.local_laps().len(), 1);
}

#[tokio::test]
async fn opponent_laps_dispatch_before_local_laps() {
    let mut local = local_lap(1, 30).build();
    local.extend(local_lap(2, 1).previous_lap_time(Some(95.0)).build());
    let mut opponent = opponent_lap(7, 1, 30).build();
    opponent.extend(opponent_lap(7, 2, 1).previous_lap_time(Some(96.0)).build());
    let mut harness = Harness::new(test_config(), interleave(vec![local, opponent]));

    let statuses = harness.steps(31).await;

    assert_eq!(statuses.last().unwrap().laps_emitted, 2);
    let origins: Vec<LapOrigin> = harness.sink.events().iter().map(|e| e.origin).collect();
    assert_eq!(origins, vec![LapOrigin::Opponent, LapOrigin::Local]);
}

#[tokio::test]
async fn pause_stops_reading_the_source() {
    let local = local_lap(1, 30).build();
    let mut harness = Harness::new(test_config(), interleave(vec![local]));

    harness.steps(5).await;
    harness.capture.pause();
    for status in harness.steps(10).await {
        assert!(status.paused);
        assert!(status.process_detected);
        assert_eq!(status.samples_buffered, 5);
    }

    harness.capture.resume();
    let status = harness.step().await;
    assert!(!status.paused);
    assert_eq!(status.samples_buffered, 6);
}

#[tokio::test]
async fn pause_across_lap_boundaries_yields_a_partial_lap() {
    // Readings resume two lap numbers later, as they would after a long pause.
    let mut local = local_lap(1, 450).build();
    local.truncate(200);
    local.extend(local_lap(3, 450).previous_lap_time(Some(91.0)).build());
    local.extend(local_lap(4, 1).previous_lap_time(Some(93.0)).build());
    let mut harness = Harness::new(test_config(), interleave(vec![local]));

    harness.steps(200).await;
    harness.capture.pause();
    harness.steps(20).await;
    harness.capture.resume();

    let status = harness.step().await;
    assert_eq!(status.laps_emitted, 1);
    assert_eq!(status.current_lap, Some(3));
    let partial = harness.sink.local_laps().remove(0);
    assert_eq!(partial.lap_number, 1);
    assert_eq!(partial.sample_count(), 200);
    assert!(!partial.completed());
    assert_eq!(partial.discard_reason, Some(DiscardReason::SourceLost));
    assert_ne!(partial.lap_time_s, 91.0);

    harness.steps(450).await;
    let laps = harness.sink.local_laps();
    assert_eq!(laps.len(), 2);
    assert_eq!(laps[1].lap_number, 3);
    assert!(laps[1].completed());
    assert_eq!(laps[1].lap_time_s, 93.0);
}

#[tokio::test]
async fn stopped_loop_does_nothing() {
    let local = local_lap(1, 30).build();
    let mut harness = Harness::new(test_config(), interleave(vec![local]));
    harness.capture.stop();

    let status = harness.step().await;
    assert!(!status.running);
    assert_eq!(status.tick, 0);
    assert!(!status.process_detected);

    harness.capture.start();
    let status = harness.step().await;
    assert_eq!(status.tick, 1);
    assert_eq!(status.samples_buffered, 1);
}

#[tokio::test]
async fn session_change_resets_everything_without_emitting() {
    let local = local_lap(1, 40).build();
    let opponent = opponent_lap(7, 1, 40).build();
    let mut ticks = interleave(vec![local[..20].to_vec(), opponent[..20].to_vec()]);
    let mut next = test_metadata();
    next.session_id = SessionId::parse("race-2");
    let mut rest = interleave(vec![local[20..].to_vec(), opponent[20..].to_vec()]);
    rest[0] = rest[0].clone().with_metadata(next);
    ticks.extend(rest);
    let mut harness = Harness::new(test_config(), ticks);

    harness.steps(20).await;
    let changed = harness.step().await;

    assert_eq!(changed.session_id, SessionId::parse("race-2"));
    assert!(changed.state_changed);
    assert_eq!(changed.laps_emitted, 0);
    assert!(harness.sink.events().is_empty());
    // Both restart from the first reading of the new session, which is mid-lap.
    assert_eq!(changed.samples_buffered, 1);
    assert_eq!(changed.opponents_tracked, 1);
}

#[tokio::test]
async fn sector_boundaries_are_learned_from_first_valid_lap() {
    let with_splits = |mut samples: Vec<RawSample>| {
        for sample in samples.iter_mut() {
            sample.sector1_split_s = Some(if sample.lap_distance_m >= 1830.0 { 32.0 } else { 0.0 });
            sample.sector2_split_s = Some(if sample.lap_distance_m >= 3620.0 { 64.0 } else { 0.0 });
        }
        samples
    };
    let mut local = with_splits(local_lap(1, 450).build());
    local.extend(with_splits(local_lap(2, 450).previous_lap_time(Some(95.0)).build()));
    local.extend(local_lap(3, 1).previous_lap_time(Some(95.0)).build());
    let mut harness = Harness::new(test_config(), interleave(vec![local]));

    harness.steps(451).await;
    let learned = harness.capture.learned_boundaries().expect("boundaries learned").to_vec();
    assert_eq!(learned.len(), 3);
    assert!((learned[0] - 1836.0).abs() < 1e-6);
    assert!((learned[1] - 3624.0).abs() < 1e-6);
    assert_eq!(learned[2], 5400.0);

    harness.steps(450).await;
    let laps = harness.sink.local_laps();
    assert_eq!(laps.len(), 2);

    // 1812 m is sector 1 by equal thirds but still sector 0 by the learned split.
    let first_lap = laps[0].samples.iter().find(|s| (s.lap_distance_m - 1812.0).abs() < 1e-6).unwrap();
    let second_lap = laps[1].samples.iter().find(|s| (s.lap_distance_m - 1812.0).abs() < 1e-6).unwrap();
    assert_eq!(first_lap.sector, 1);
    assert_eq!(second_lap.sector, 0);
}

/// Source whose vehicle list never answers.
struct StalledSource;

#[async_trait::async_trait]
impl SampleSource for StalledSource {
    async fn is_available(&mut self) -> bool {
        true
    }

    async fn read_session_metadata(&mut self) -> Result<SessionMetadata> {
        Ok(test_metadata())
    }

    async fn read_all_vehicles(&mut self) -> Result<Vec<RawSample>> {
        std::future::pending().await
    }

    async fn read_local_vehicle(&mut self) -> Result<Option<RawSample>> {
        Ok(local_lap(1, 1).build().pop())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_source_read_times_out() {
    let process = SimulatedProcess::running(PROCESS);
    let mut capture = CaptureLoop::new(test_config(), StalledSource, process.enumerator()).unwrap();
    capture.start();

    let status = capture.run_once().await;

    assert_eq!(status.diagnostics.len(), 1);
    assert_eq!(status.diagnostics[0].kind, ErrorKind::Timeout);
    assert!(status.diagnostics[0].message.contains("read_all_vehicles"));
    // The local driver is still advanced.
    assert_eq!(status.samples_buffered, 1);
}

#[test]
fn invalid_config_is_rejected() {
    let config = CaptureConfig { poll_interval_ms: 0, ..Default::default() };
    let process = SimulatedProcess::running(PROCESS);
    let result = CaptureLoop::new(config, StalledSource, process.enumerator());
    assert!(matches!(result, Err(CaptureError::Config { .. })));
}
