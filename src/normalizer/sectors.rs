//! Sector boundary discovery from split times
//!
//! The source reports cumulative sector splits that stay non-positive until the
//! car crosses the corresponding sector line. The lap distance at which a split
//! first turns positive is the boundary.

use crate::types::RawSample;

/// The part of a reading that matters for sector discovery.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SectorObservation {
    pub lap_distance_m: f64,
    pub sector1_split_s: Option<f64>,
    pub sector2_split_s: Option<f64>,
}

impl From<&RawSample> for SectorObservation {
    fn from(raw: &RawSample) -> Self {
        Self {
            lap_distance_m: raw.lap_distance_m,
            sector1_split_s: raw.sector1_split_s,
            sector2_split_s: raw.sector2_split_s,
        }
    }
}

fn crossed(split: Option<f64>) -> bool {
    split.is_some_and(|s| s.is_finite() && s > 0.0)
}

/// Records where sector splits first appear during one lap.
#[derive(Debug, Clone, Default)]
pub struct SectorCrossingTracker {
    sector1_at: Option<f64>,
    sector2_at: Option<f64>,
}

impl SectorCrossingTracker {
    pub fn observe(&mut self, observation: SectorObservation) {
        if self.sector1_at.is_none() && crossed(observation.sector1_split_s) {
            self.sector1_at = Some(observation.lap_distance_m);
        }
        if self.sector2_at.is_none() && crossed(observation.sector2_split_s) {
            self.sector2_at = Some(observation.lap_distance_m);
        }
    }

    /// Crossing distances seen so far, in lap order.
    pub fn crossings(&self) -> Vec<f64> {
        let mut crossings: Vec<f64> = self.sector1_at.into_iter().chain(self.sector2_at).collect();
        crossings.sort_by(f64::total_cmp);
        crossings
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Turn crossing distances into sector end distances.
///
/// The track length closes the last sector. Without crossings the lap is split
/// into `fallback_count` equal sectors. Returns the boundaries and the sector count.
pub fn boundaries_from_crossings(
    crossings: &[f64],
    track_length_m: f64,
    fallback_count: u32,
) -> (Vec<f64>, usize) {
    let mut boundaries: Vec<f64> = crossings
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > 0.0 && *d < track_length_m)
        .collect();

    if boundaries.is_empty() {
        let count = fallback_count.max(1);
        let boundaries: Vec<f64> =
            (1..=count).map(|i| track_length_m * i as f64 / count as f64).collect();
        return (boundaries, count as usize);
    }

    boundaries.sort_by(f64::total_cmp);
    boundaries.dedup();
    boundaries.push(track_length_m);
    let count = boundaries.len();
    (boundaries, count)
}

/// Detect sector boundaries from one lap's observations.
pub fn detect_sector_boundaries(
    observations: &[SectorObservation],
    track_length_m: f64,
) -> (Vec<f64>, usize) {
    let mut tracker = SectorCrossingTracker::default();
    for observation in observations {
        tracker.observe(*observation);
    }
    boundaries_from_crossings(&tracker.crossings(), track_length_m, 3)
}
