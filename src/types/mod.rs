//! Core types for capture and segmentation.
//!
//! Data flows one way through these types:
//! - [`RawSample`] is one vehicle's reading for one tick, in source units
//! - [`NormalizedSample`] is the canonical fixed-schema record derived from it
//! - [`CompletedLap`] is an ordered run of normalized samples closed at a lap boundary
//!
//! [`SessionMetadata`] and [`TrackGeometry`] carry the session-wide facts the
//! normalizer and segmenters need.
//!
//! ## Usage Example
//!
//! ```rust
//! use laplogger::types::{ControlSource, RawSample, VehicleIdentity};
//!
//! let sample = RawSample {
//!     identity: VehicleIdentity::new(12, "John Doe"),
//!     control: ControlSource::from_code(2),
//!     lap_number: 3,
//!     last_lap_time_s: Some(95.2),
//!     ..Default::default()
//! };
//!
//! assert!(sample.control.is_opponent());
//! assert_eq!(sample.reported_last_lap_time(), Some(95.2));
//! ```

mod lap;
mod normalized;
mod sample;
mod session;
mod update_rate;

pub use lap::{CompletedLap, DiscardReason, LapSummary, LapTimeSource};
pub use normalized::NormalizedSample;
pub use sample::{ControlSource, Position, RawSample, VehicleId, VehicleIdentity};
pub use session::{SessionId, SessionMetadata, SessionType, TrackGeometry};
pub use update_rate::StatusRate;
