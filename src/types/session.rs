//! Session metadata and track geometry

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one simulation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Returns `None` for blank ids, which the source uses while no session is loaded.
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() { None } else { Some(Self(trimmed.to_string())) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    TestDay,
    Practice,
    Qualifying,
    Warmup,
    Race,
    #[default]
    Unknown,
}

/// Session-wide facts read once per tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    pub session_id: Option<SessionId>,
    pub session_type: SessionType,
    pub track_name: Option<String>,
    /// Track length (m); zero when unknown
    pub track_length_m: f64,
    /// Ordered sector end distances (m), empty when unknown
    pub sector_boundaries_m: Vec<f64>,
}

impl SessionMetadata {
    /// The session id, unless it is missing or blank.
    pub fn recognized_session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref().filter(|id| !id.as_str().trim().is_empty())
    }

    pub fn geometry(&self) -> TrackGeometry {
        TrackGeometry {
            length_m: self.track_length_m,
            sector_boundaries_m: self.sector_boundaries_m.clone(),
        }
    }
}

/// What the normalizer needs to know about the track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackGeometry {
    pub length_m: f64,
    pub sector_boundaries_m: Vec<f64>,
}

impl TrackGeometry {
    pub fn new(length_m: f64) -> Self {
        Self { length_m, sector_boundaries_m: Vec::new() }
    }

    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.sector_boundaries_m = boundaries;
        self
    }

    /// Track length when it is usable for sector math.
    pub fn known_length(&self) -> Option<f64> {
        (self.length_m.is_finite() && self.length_m > 0.0).then_some(self.length_m)
    }
}
