//! Replay source for recorded tick scripts

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, trace};

use crate::source::SampleSource;
use crate::types::{ControlSource, RawSample, SessionMetadata};
use crate::{CaptureError, Result};

/// One recorded tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayTick {
    /// `false` records a tick where the source could not be read
    pub available: bool,
    /// Replaces the session metadata from this tick on; absent keeps the previous one
    pub metadata: Option<SessionMetadata>,
    /// Every vehicle, local driver included
    pub vehicles: Vec<RawSample>,
}

impl ReplayTick {
    pub fn new(vehicles: Vec<RawSample>) -> Self {
        Self { available: true, metadata: None, vehicles }
    }

    /// A tick on which the source is down.
    pub fn unavailable() -> Self {
        Self { available: false, metadata: None, vehicles: Vec::new() }
    }

    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ReplayScript {
    #[serde(default)]
    metadata: SessionMetadata,
    ticks: Vec<RawTick>,
}

/// `available` defaults to true in scripts, unlike `ReplayTick::default()`.
#[derive(Debug, Deserialize)]
struct RawTick {
    #[serde(default = "available_by_default")]
    available: bool,
    #[serde(default)]
    metadata: Option<SessionMetadata>,
    #[serde(default)]
    vehicles: Vec<RawSample>,
}

fn available_by_default() -> bool {
    true
}

/// Source that plays back a fixed sequence of ticks.
///
/// Every call to [`is_available`](SampleSource::is_available) advances one
/// tick; the reads that follow return that tick's data. Pacing is left to
/// whoever drives the capture loop. After the last tick the source reports
/// itself unavailable.
pub struct ReplaySource {
    ticks: Vec<ReplayTick>,
    /// Index of the current tick, `None` before the first advance
    cursor: Option<usize>,
    metadata: SessionMetadata,
}

impl ReplaySource {
    pub fn new(metadata: SessionMetadata, ticks: Vec<ReplayTick>) -> Self {
        info!(ticks = ticks.len(), "Replay source ready");
        Self { ticks, cursor: None, metadata }
    }

    /// Parse a YAML script of the form `{ metadata: ..., ticks: [...] }`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let script: ReplayScript = serde_yaml_ng::from_str(yaml)?;
        let ticks = script
            .ticks
            .into_iter()
            .map(|t| ReplayTick { available: t.available, metadata: t.metadata, vehicles: t.vehicles })
            .collect();
        Ok(Self::new(script.metadata, ticks))
    }

    /// Load a YAML script from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::file_error(path.to_path_buf(), e))?;
        debug!(path = %path.display(), "Loaded replay script");
        Self::from_yaml_str(&yaml)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Whether every tick has been played.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_some_and(|c| c >= self.ticks.len())
    }

    fn current(&self) -> Result<&ReplayTick> {
        match self.cursor.and_then(|c| self.ticks.get(c)) {
            Some(tick) if tick.available => Ok(tick),
            Some(_) => Err(CaptureError::source_unavailable("recorded outage")),
            None => Err(CaptureError::source_unavailable("replay not started or finished")),
        }
    }
}

#[async_trait::async_trait]
impl SampleSource for ReplaySource {
    async fn is_available(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c.saturating_add(1));
        self.cursor = Some(next.min(self.ticks.len()));

        let Some(tick) = self.ticks.get(next) else {
            trace!("Replay exhausted");
            return false;
        };
        if let Some(metadata) = &tick.metadata {
            self.metadata = metadata.clone();
        }
        trace!(tick = next, available = tick.available, "Replay tick");
        tick.available
    }

    async fn read_session_metadata(&mut self) -> Result<SessionMetadata> {
        self.current()?;
        Ok(self.metadata.clone())
    }

    async fn read_all_vehicles(&mut self) -> Result<Vec<RawSample>> {
        Ok(self.current()?.vehicles.clone())
    }

    async fn read_local_vehicle(&mut self) -> Result<Option<RawSample>> {
        Ok(self
            .current()?
            .vehicles
            .iter()
            .find(|v| v.control == ControlSource::LocalHuman)
            .cloned())
    }
}
