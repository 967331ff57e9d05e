//! Per-tick status snapshots

use serde::{Deserialize, Serialize};

use crate::segmenter::SegmenterState;
use crate::types::{SessionId, VehicleId};
use crate::{CaptureError, ErrorKind};

/// A failure caught during a tick, attributed to a vehicle where possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickDiagnostic {
    pub vehicle: Option<VehicleId>,
    pub kind: ErrorKind,
    pub message: String,
}

impl TickDiagnostic {
    pub fn new(vehicle: Option<VehicleId>, error: &CaptureError) -> Self {
        Self { vehicle, kind: error.kind(), message: error.to_string() }
    }
}

/// What the capture loop looked like at the end of one `run_once`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoopStatus {
    /// Number of ticks executed while running
    pub tick: u64,
    pub running: bool,
    pub paused: bool,
    pub process_detected: bool,
    pub source_available: bool,
    pub session_id: Option<SessionId>,
    /// Local driver's segmenter state
    pub local_state: SegmenterState,
    pub current_lap: Option<u32>,
    pub samples_buffered: usize,
    pub opponents_tracked: usize,
    /// Laps handed to sinks during this tick
    pub laps_emitted: usize,
    pub total_laps_emitted: u64,
    /// Any of the fields above except the counters differ from the previous status
    pub state_changed: bool,
    pub diagnostics: Vec<TickDiagnostic>,
}

impl LoopStatus {
    /// Statuses that rate-limited observers must still see.
    pub fn is_urgent(&self) -> bool {
        self.laps_emitted > 0 || self.state_changed
    }

    pub(crate) fn state_key(&self) -> StateKey {
        StateKey {
            running: self.running,
            paused: self.paused,
            process_detected: self.process_detected,
            source_available: self.source_available,
            session_id: self.session_id.clone(),
            local_state: self.local_state,
            current_lap: self.current_lap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StateKey {
    running: bool,
    paused: bool,
    process_detected: bool,
    source_available: bool,
    session_id: Option<SessionId>,
    local_state: SegmenterState,
    current_lap: Option<u32>,
}
