//! Raw reading to canonical sample conversion
//!
//! [`SampleNormalizer`] is a pure function object: it holds only configuration
//! and can be shared freely between segmenters.

mod sectors;

pub use sectors::{
    SectorCrossingTracker, SectorObservation, boundaries_from_crossings, detect_sector_boundaries,
};

use crate::config::NormalizerConfig;
use crate::types::{NormalizedSample, RawSample, TrackGeometry};
use crate::{CaptureError, Result};

/// Largest fraction of a lap used for equal-division sector math, keeps the
/// finish line itself inside the last sector.
const MAX_LAP_FRACTION: f64 = 0.9999;

const MS_TO_KMH: f64 = 3.6;

/// Converts [`RawSample`]s into [`NormalizedSample`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleNormalizer {
    sector_count: u32,
    max_steering_travel: f64,
}

impl Default for SampleNormalizer {
    fn default() -> Self {
        Self::new(&NormalizerConfig::default())
    }
}

impl SampleNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            sector_count: config.sector_count.max(1),
            max_steering_travel: config.max_steering_travel,
        }
    }

    pub fn sector_count(&self) -> u32 {
        self.sector_count
    }

    /// Normalize one reading.
    ///
    /// Fails with [`CaptureError::MalformedSample`] when a required channel is
    /// not a finite number. A non-finite position is dropped rather than failing
    /// the sample, since position is optional.
    pub fn normalize(&self, raw: &RawSample, track: &TrackGeometry) -> Result<NormalizedSample> {
        let vehicle = Some(raw.vehicle_id());
        let finite = |field: &str, value: f64| -> Result<f64> {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(CaptureError::malformed(vehicle, field, format!("is not finite ({})", value)))
            }
        };

        let lap_distance_m = finite("lap_distance_m", raw.lap_distance_m)?;
        let elapsed_s = finite("time_into_lap_s", raw.time_into_lap_s)?;
        let speed_ms = finite("speed_ms", raw.speed_ms)?;
        let engine_rpm = finite("engine_rpm", raw.engine_rpm)?;
        let throttle = finite("throttle", raw.throttle)?;
        let brake = finite("brake", raw.brake)?;
        let steering = finite("steering", raw.steering)?;

        Ok(NormalizedSample {
            lap_distance_m,
            elapsed_s,
            sector: self.sector_index(lap_distance_m, track),
            speed_kmh: speed_ms.abs() * MS_TO_KMH,
            engine_rpm,
            throttle_pct: fraction_to_percent(throttle),
            brake_pct: fraction_to_percent(brake),
            steering_pct: self.steering_percent(steering),
            gear: raw.gear,
            position: raw.position.filter(|p| p.is_finite()),
        })
    }

    /// Zero-based sector for a lap distance.
    ///
    /// Without a usable track length every distance maps to sector 0. Otherwise
    /// explicit boundaries win over equal division.
    pub fn sector_index(&self, lap_distance_m: f64, track: &TrackGeometry) -> u32 {
        let Some(length) = track.known_length() else {
            return 0;
        };

        let boundaries = &track.sector_boundaries_m;
        if !boundaries.is_empty() {
            let last = boundaries.len() - 1;
            let index = boundaries.iter().position(|end| lap_distance_m < *end).unwrap_or(last);
            return index as u32;
        }

        let progress = (lap_distance_m / length).clamp(0.0, MAX_LAP_FRACTION);
        (progress * self.sector_count as f64).floor() as u32
    }

    fn steering_percent(&self, steering: f64) -> f64 {
        (steering / self.max_steering_travel * 100.0).clamp(-100.0, 100.0)
    }
}

fn fraction_to_percent(fraction: f64) -> f64 {
    (fraction * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, VehicleId};
    use proptest::prelude::*;

    fn raw() -> RawSample {
        RawSample {
            lap_distance_m: 300.0,
            time_into_lap_s: 12.5,
            speed_ms: 50.0,
            engine_rpm: 7200.0,
            throttle: 0.9968,
            brake: 0.0,
            steering: -0.25,
            gear: 4,
            ..Default::default()
        }
    }

    #[test]
    fn scales_fractional_inputs() {
        let sample = SampleNormalizer::default().normalize(&raw(), &TrackGeometry::default()).unwrap();
        assert!((sample.throttle_pct - 99.68).abs() < 0.01);
        assert_eq!(sample.brake_pct, 0.0);
        assert!((sample.speed_kmh - 180.0).abs() < 1e-9);
        assert_eq!(sample.engine_rpm, 7200.0);
        assert_eq!(sample.gear, 4);
        assert_eq!(sample.elapsed_s, 12.5);
    }

    #[test]
    fn steering_at_full_travel_is_full_scale() {
        let normalizer =
            SampleNormalizer::new(&NormalizerConfig { sector_count: 3, max_steering_travel: 0.5 });
        let track = TrackGeometry::default();

        let left = normalizer.normalize(&RawSample { steering: -0.5, ..raw() }, &track).unwrap();
        let right = normalizer.normalize(&RawSample { steering: 0.5, ..raw() }, &track).unwrap();
        let beyond = normalizer.normalize(&RawSample { steering: 0.9, ..raw() }, &track).unwrap();
        let half = normalizer.normalize(&RawSample { steering: 0.25, ..raw() }, &track).unwrap();

        assert_eq!(left.steering_pct, -100.0);
        assert_eq!(right.steering_pct, 100.0);
        assert_eq!(beyond.steering_pct, 100.0);
        assert!((half.steering_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn pedals_are_clamped() {
        let sample = SampleNormalizer::default()
            .normalize(&RawSample { throttle: 1.2, brake: -0.1, ..raw() }, &TrackGeometry::default())
            .unwrap();
        assert_eq!(sample.throttle_pct, 100.0);
        assert_eq!(sample.brake_pct, 0.0);
    }

    #[test]
    fn non_finite_channel_is_malformed() {
        let bad = RawSample {
            identity: crate::types::VehicleIdentity::new(9, "Bot"),
            speed_ms: f64::NAN,
            ..raw()
        };
        let err = SampleNormalizer::default().normalize(&bad, &TrackGeometry::default()).unwrap_err();
        match err {
            CaptureError::MalformedSample { vehicle, field, .. } => {
                assert_eq!(vehicle, Some(VehicleId(9)));
                assert_eq!(field, "speed_ms");
            }
            other => panic!("expected malformed sample, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_position_is_dropped() {
        let normalizer = SampleNormalizer::default();
        let track = TrackGeometry::default();

        let with_position = RawSample { position: Some(Position { x: 1.0, y: 2.0, z: 3.0 }), ..raw() };
        assert_eq!(
            normalizer.normalize(&with_position, &track).unwrap().position,
            Some(Position { x: 1.0, y: 2.0, z: 3.0 })
        );

        let broken = RawSample { position: Some(Position { x: f64::INFINITY, y: 0.0, z: 0.0 }), ..raw() };
        assert_eq!(normalizer.normalize(&broken, &track).unwrap().position, None);
    }

    #[test]
    fn sector_estimation_uses_track_length() {
        let normalizer = SampleNormalizer::default();
        let track = TrackGeometry::new(900.0);
        assert_eq!(normalizer.sector_index(0.0, &track), 0);
        assert_eq!(normalizer.sector_index(299.0, &track), 0);
        assert_eq!(normalizer.sector_index(300.0, &track), 1);
        assert_eq!(normalizer.sector_index(899.0, &track), 2);
        assert_eq!(normalizer.sector_index(900.0, &track), 2);
        assert_eq!(normalizer.sector_index(5000.0, &track), 2);
        assert_eq!(normalizer.sector_index(-5.0, &track), 0);
    }

    #[test]
    fn sector_uses_boundaries_when_available() {
        let normalizer = SampleNormalizer::default();
        let track = TrackGeometry::new(5400.0).with_boundaries(vec![1800.0, 3600.0, 5400.0]);
        assert_eq!(normalizer.sector_index(1000.0, &track), 0);
        assert_eq!(normalizer.sector_index(2500.0, &track), 1);
        assert_eq!(normalizer.sector_index(4000.0, &track), 2);
        assert_eq!(normalizer.sector_index(5400.0, &track), 2);

        let two = TrackGeometry::new(5400.0).with_boundaries(vec![2700.0, 5400.0]);
        assert_eq!(normalizer.sector_index(3000.0, &two), 1);

        let four = TrackGeometry::new(4000.0).with_boundaries(vec![1000.0, 2000.0, 3000.0, 4000.0]);
        assert_eq!(normalizer.sector_index(500.0, &four), 0);
        assert_eq!(normalizer.sector_index(3500.0, &four), 3);
    }

    proptest! {
        #[test]
        fn unknown_track_length_always_sector_zero(distance in -1.0e5f64..1.0e5) {
            let normalizer = SampleNormalizer::default();
            prop_assert_eq!(normalizer.sector_index(distance, &TrackGeometry::new(0.0)), 0);
            prop_assert_eq!(normalizer.sector_index(distance, &TrackGeometry::new(-1.0)), 0);
            let bounded = TrackGeometry::new(0.0).with_boundaries(vec![1800.0, 3600.0, 5400.0]);
            prop_assert_eq!(normalizer.sector_index(distance, &bounded), 0);
        }

        #[test]
        fn sector_index_stays_in_range(
            distance in -1.0e5f64..1.0e5,
            length in 100.0f64..30_000.0,
            count in 1u32..8,
        ) {
            let normalizer = SampleNormalizer::new(&NormalizerConfig { sector_count: count, max_steering_travel: 1.0 });
            let sector = normalizer.sector_index(distance, &TrackGeometry::new(length));
            prop_assert!(sector < count);
        }
    }
}
