//! Capture configuration
//!
//! All options have defaults, so an empty YAML document is a valid
//! configuration. Durations are written in the unit named by the key.
//!
//! ```rust
//! use laplogger::{CaptureConfig, RetentionPolicy};
//!
//! let config = CaptureConfig::from_yaml_str(
//!     "target_process: LMU\nsegmenter:\n  min_lap_time_s: 45\nopponents:\n  track_ai: true\n",
//! )
//! .unwrap();
//!
//! assert_eq!(config.segmenter.min_lap_time_s, 45.0);
//! assert_eq!(config.segmenter.min_lap_samples, 10);
//! assert_eq!(config.opponents.retention, RetentionPolicy::FastestLapOnly);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{CaptureError, Result};

/// Longest accepted inactivity or vehicle timeout: one day.
pub const MAX_TIMEOUT_S: f64 = 86_400.0;

fn clamped_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.clamp(0.0, MAX_TIMEOUT_S)).unwrap_or(Duration::ZERO)
}

/// Top-level options for the capture loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Case-insensitive substring of the simulation's process name
    pub target_process: String,
    /// Cadence of `run_once` when driven by [`CaptureDriver`](crate::CaptureDriver)
    pub poll_interval_ms: u64,
    /// Upper bound on each sample source read
    pub source_timeout_ms: u64,
    pub presence: PresenceConfig,
    pub segmenter: SegmenterConfig,
    pub normalizer: NormalizerConfig,
    pub opponents: OpponentConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_process: "Le Mans Ultimate".to_string(),
            poll_interval_ms: 10,
            source_timeout_ms: 250,
            presence: PresenceConfig::default(),
            segmenter: SegmenterConfig::default(),
            normalizer: NormalizerConfig::default(),
            opponents: OpponentConfig::default(),
        }
    }
}

/// Process presence polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Minimum time between process list enumerations
    pub check_interval_ms: u64,
    /// Consecutive absent observations before a present process is reported absent
    pub debounce_polls: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { check_interval_ms: 1000, debounce_polls: 3 }
    }
}

/// Lap segmentation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Laps faster than this are tagged `too_short`
    pub min_lap_time_s: f64,
    /// Laps with fewer samples are tagged `too_short`
    pub min_lap_samples: usize,
    /// How long speed and throttle must stay low before a lap is abandoned
    pub inactivity_timeout_s: f64,
    pub min_speed_kmh: f64,
    pub min_throttle_pct: f64,
    /// Backwards lap-distance jump that counts as a teleport
    pub lap_reset_tolerance_m: f64,
    /// Buffering that starts farther than this from the line marks the lap partial
    pub lap_start_tolerance_m: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_lap_time_s: 30.0,
            min_lap_samples: 10,
            inactivity_timeout_s: 5.0,
            min_speed_kmh: 1.0,
            min_throttle_pct: 5.0,
            lap_reset_tolerance_m: 5.0,
            lap_start_tolerance_m: 50.0,
        }
    }
}

impl SegmenterConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        clamped_secs(self.inactivity_timeout_s)
    }
}

/// Sample normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Sectors used when the track provides no explicit boundaries
    pub sector_count: u32,
    /// Raw steering value that corresponds to full lock
    pub max_steering_travel: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { sector_count: 3, max_steering_travel: 1.0 }
    }
}

/// Which opponent laps are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Emit a lap only when it beats that opponent's best so far
    #[default]
    FastestLapOnly,
    /// Emit every finalized lap, complete or not
    AllLaps,
}

/// Opponent tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpponentConfig {
    pub track_opponents: bool,
    /// Also track AI-controlled vehicles
    pub track_ai: bool,
    pub retention: RetentionPolicy,
    /// Drop a vehicle that has not been seen for this long
    pub vehicle_timeout_s: f64,
}

impl Default for OpponentConfig {
    fn default() -> Self {
        Self {
            track_opponents: true,
            track_ai: false,
            retention: RetentionPolicy::FastestLapOnly,
            vehicle_timeout_s: 5.0,
        }
    }
}

impl OpponentConfig {
    pub fn vehicle_timeout(&self) -> Duration {
        clamped_secs(self.vehicle_timeout_s)
    }
}

impl CaptureConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: CaptureConfig = if yaml.trim().is_empty() {
            CaptureConfig::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::file_error(path.to_path_buf(), e))?;
        debug!(path = %path.display(), bytes = yaml.len(), "Loaded capture config");
        Self::from_yaml_str(&yaml)
    }

    /// Reject values that would make the state machines misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.target_process.trim().is_empty() {
            return Err(CaptureError::config("target_process", "must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(CaptureError::config("poll_interval_ms", "must be positive"));
        }
        if self.source_timeout_ms == 0 {
            return Err(CaptureError::config("source_timeout_ms", "must be positive"));
        }
        if self.normalizer.sector_count == 0 {
            return Err(CaptureError::config("normalizer.sector_count", "must be at least 1"));
        }
        if !(self.normalizer.max_steering_travel.is_finite()
            && self.normalizer.max_steering_travel > 0.0)
        {
            return Err(CaptureError::config(
                "normalizer.max_steering_travel",
                "must be a positive number",
            ));
        }

        let segmenter = &self.segmenter;
        for (field, value) in [
            ("segmenter.min_lap_time_s", segmenter.min_lap_time_s),
            ("segmenter.inactivity_timeout_s", segmenter.inactivity_timeout_s),
            ("segmenter.min_speed_kmh", segmenter.min_speed_kmh),
            ("segmenter.min_throttle_pct", segmenter.min_throttle_pct),
            ("segmenter.lap_reset_tolerance_m", segmenter.lap_reset_tolerance_m),
            ("segmenter.lap_start_tolerance_m", segmenter.lap_start_tolerance_m),
            ("opponents.vehicle_timeout_s", self.opponents.vehicle_timeout_s),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CaptureError::config(field, format!("must be >= 0, got {}", value)));
            }
        }
        for (field, value) in [
            ("segmenter.inactivity_timeout_s", segmenter.inactivity_timeout_s),
            ("opponents.vehicle_timeout_s", self.opponents.vehicle_timeout_s),
        ] {
            if value > MAX_TIMEOUT_S {
                return Err(CaptureError::config(
                    field,
                    format!("must be at most {} s, got {}", MAX_TIMEOUT_S, value),
                ));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn poll_hz(&self) -> f64 {
        1000.0 / self.poll_interval_ms.max(1) as f64
    }
}
