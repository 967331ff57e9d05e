//! Sample source trait for telemetry adapters

use crate::Result;
use crate::types::{RawSample, SessionMetadata};

/// Trait for telemetry sample sources
///
/// A source wraps whatever the simulation exposes (shared memory, a REST
/// endpoint, a recorded script) and hands out one reading per vehicle per
/// tick. The capture loop calls these in order on every tick:
/// `is_available`, `read_session_metadata`, `read_all_vehicles`,
/// `read_local_vehicle`. Each call runs under the configured source timeout.
#[async_trait::async_trait]
pub trait SampleSource: Send + 'static {
    /// Whether readings can be taken this tick
    async fn is_available(&mut self) -> bool;

    /// Session-wide facts for this tick
    async fn read_session_metadata(&mut self) -> Result<SessionMetadata>;

    /// Every vehicle in the session, local driver included, tagged by control source
    async fn read_all_vehicles(&mut self) -> Result<Vec<RawSample>>;

    /// The local driver's vehicle
    ///
    /// Returns:
    /// - `Ok(Some(sample))` - Reading for the local vehicle
    /// - `Ok(None)` - No local vehicle this tick (spectating, between sessions)
    /// - `Err(e)` - Read failed
    async fn read_local_vehicle(&mut self) -> Result<Option<RawSample>>;
}
