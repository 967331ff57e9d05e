//! Capture-and-segmentation engine for sim racing telemetry.
//!
//! laplogger watches for a running simulation, samples every vehicle once per
//! tick, cuts each vehicle's sample stream into laps and hands every finished
//! lap to caller-supplied sinks.
//!
//! # Features
//!
//! - **Presence detection**: debounced, rate-limited process checks
//! - **Per-vehicle lap state machines**: the local driver and each opponent are
//!   segmented independently
//! - **Partial lap handling**: pit stops, teleports, source loss and mid-lap
//!   joins are emitted with a discard reason instead of being mixed into
//!   complete laps
//! - **Opponent retention**: keep every lap or only each opponent's fastest
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use laplogger::sources::ReplaySource;
//! use laplogger::{
//!     CaptureConfig, CaptureDriver, CaptureLoop, ChannelSink, StatusRate, SystemProcessEnumerator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CaptureConfig::load("laplogger.yaml")?;
//!     let source = ReplaySource::load("session.yaml")?;
//!     let (sink, mut laps) = ChannelSink::new();
//!
//!     let capture = CaptureLoop::new(config, source, SystemProcessEnumerator::new())?.with_sink(sink);
//!     let handle = CaptureDriver::spawn(capture);
//!
//!     let mut status = handle.status_updates(StatusRate::Max(4));
//!     tokio::spawn(async move {
//!         while let Some(event) = laps.recv().await {
//!             println!("{:?} lap {}: {:.3}s", event.origin, event.lap.lap_number, event.lap.lap_time_s);
//!         }
//!     });
//!     while let Some(update) = status.next().await {
//!         println!("tick {} lap {:?}", update.tick, update.current_lap);
//!     }
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod driver;
mod error;
pub mod normalizer;
pub mod opponents;
pub mod presence;
pub mod segmenter;
pub mod sink;
pub mod source;
pub mod sources;
pub mod stream;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Core exports
pub use error::*;
pub use types::*;

pub use capture::{CaptureLoop, LoopStatus, TickDiagnostic};
pub use config::{
    CaptureConfig, NormalizerConfig, OpponentConfig, PresenceConfig, RetentionPolicy,
    SegmenterConfig,
};
pub use driver::{CaptureDriver, CaptureHandle};
pub use normalizer::SampleNormalizer;
pub use opponents::OpponentTracker;
pub use presence::{Presence, PresenceMonitor, ProcessEnumerator, SystemProcessEnumerator};
pub use segmenter::{LapSegmenter, SegmenterState};
pub use sink::{ChannelSink, LapEvent, LapOrigin, LapSink};
pub use source::SampleSource;
