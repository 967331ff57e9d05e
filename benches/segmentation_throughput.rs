//! Benchmarks for per-tick segmentation cost
//!
//! At the default 100 Hz cadence a tick has 10ms; these measure how much of it
//! goes to:
//! - one segmenter buffering and closing a 450-sample lap
//! - an opponent field of 10 to 60 cars advanced for one lap
//! - full capture loop ticks against a replay source
//!
//! Platform: Cross-platform (synthetic samples, CI-safe)

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use laplogger::config::PresenceConfig;
use laplogger::sources::{ReplaySource, ReplayTick};
use laplogger::test_utils::{
    CollectingSink, LapBuilder, SimulatedProcess, TEST_TRACK_LENGTH_M, test_metadata, test_session,
};
use laplogger::{
    CaptureConfig, CaptureLoop, ControlSource, LapSegmenter, OpponentConfig, OpponentTracker,
    RawSample, RetentionPolicy, SampleNormalizer, SegmenterConfig, TrackGeometry, VehicleId,
};
use std::hint::black_box;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(10);

/// Two laps for one vehicle: a full lap and the crossing sample that closes it.
fn lap_with_crossing(vehicle: u32, control: ControlSource) -> Vec<RawSample> {
    let mut samples = LapBuilder::new(vehicle, control).lap(1).build();
    samples.extend(LapBuilder::new(vehicle, control).lap(2).samples(1).previous_lap_time(Some(95.0)).build());
    samples
}

fn bench_single_lap(c: &mut Criterion) {
    let normalizer = SampleNormalizer::default();
    let track = TrackGeometry::new(TEST_TRACK_LENGTH_M);
    let session = test_session();
    let raw = lap_with_crossing(0, ControlSource::LocalHuman);
    let normalized: Vec<_> = raw.iter().map(|r| normalizer.normalize(r, &track).unwrap()).collect();

    let mut group = c.benchmark_group("segmenter");

    group.bench_function("normalize_450_samples", |b| {
        b.iter(|| {
            for sample in &raw {
                black_box(normalizer.normalize(black_box(sample), &track).unwrap());
            }
        });
    });

    group.bench_function("segment_450_sample_lap", |b| {
        b.iter_batched(
            || LapSegmenter::new(VehicleId(0), SegmenterConfig::default()),
            |mut segmenter| {
                let mut now = Duration::ZERO;
                let mut emitted = None;
                for (raw, sample) in raw.iter().zip(&normalized) {
                    if let Some(lap) = segmenter.observe(Some(&session), raw, *sample, now) {
                        emitted = Some(lap);
                    }
                    now += TICK;
                }
                black_box(emitted)
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_opponent_field(c: &mut Criterion) {
    let normalizer = SampleNormalizer::default();
    let track = TrackGeometry::new(TEST_TRACK_LENGTH_M);
    let session = test_session();
    let config = OpponentConfig { retention: RetentionPolicy::AllLaps, ..Default::default() };

    let mut group = c.benchmark_group("opponents");
    group.measurement_time(Duration::from_secs(10));

    for cars in [10u32, 30, 60] {
        let laps: Vec<Vec<RawSample>> =
            (1..=cars).map(|id| lap_with_crossing(id, ControlSource::RemoteHuman)).collect();
        let ticks: Vec<Vec<RawSample>> = (0..laps[0].len())
            .map(|i| laps.iter().map(|lap| lap[i].clone()).collect())
            .collect();

        group.bench_with_input(BenchmarkId::new("one_lap", cars), &ticks, |b, ticks| {
            b.iter_batched(
                || OpponentTracker::new(config.clone(), SegmenterConfig::default()),
                |mut tracker| {
                    let mut now = Duration::ZERO;
                    let mut laps = 0;
                    for vehicles in ticks {
                        let tick = tracker.advance(Some(&session), vehicles, &normalizer, &track, now);
                        laps += tick.laps.len();
                        now += TICK;
                    }
                    black_box(laps)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_capture_ticks(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();

    let mut field = vec![lap_with_crossing(0, ControlSource::LocalHuman)];
    field.extend((1..=20).map(|id| lap_with_crossing(id, ControlSource::RemoteHuman)));
    let ticks: Vec<ReplayTick> = (0..field[0].len())
        .map(|i| ReplayTick::new(field.iter().map(|lap| lap[i].clone()).collect()))
        .collect();

    let config = CaptureConfig {
        presence: PresenceConfig { check_interval_ms: 0, debounce_polls: 1 },
        ..Default::default()
    };
    let process = SimulatedProcess::running("Le Mans Ultimate.exe");

    let mut group = c.benchmark_group("capture_loop");
    group.bench_function("lap_of_21_cars", |b| {
        b.iter_batched(
            || {
                let source = ReplaySource::new(test_metadata(), ticks.clone());
                let mut capture = CaptureLoop::new(config.clone(), source, process.enumerator())
                    .unwrap()
                    .with_sink(CollectingSink::new());
                capture.start();
                capture
            },
            |mut capture| {
                runtime.block_on(async {
                    let mut now = Duration::ZERO;
                    for _ in 0..ticks.len() {
                        black_box(capture.run_once_at(now).await);
                        now += TICK;
                    }
                })
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_single_lap, bench_opponent_field, bench_capture_ticks);
criterion_main!(benches);
