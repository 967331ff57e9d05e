//! Lap completion handlers

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::CompletedLap;

/// Whose lap an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LapOrigin {
    Local,
    Opponent,
}

/// A finalized lap together with its origin.
#[derive(Debug, Clone)]
pub struct LapEvent {
    pub origin: LapOrigin,
    pub lap: Arc<CompletedLap>,
}

/// Receives finalized laps.
///
/// Sinks run synchronously inside the capture tick, opponents first, then the
/// local driver. A slow sink delays the rest of the tick; use [`ChannelSink`]
/// to move persistence elsewhere. An error is reported as a tick diagnostic and
/// does not stop other sinks from receiving the lap.
pub trait LapSink: Send + 'static {
    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_local_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()>;

    fn on_opponent_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()>;
}

/// Forwards every lap to an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LapEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LapEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, origin: LapOrigin, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        trace!(?origin, lap = lap.lap_number, "Forwarding lap");
        self.tx
            .send(LapEvent { origin, lap })
            .map_err(|_| anyhow::anyhow!("lap receiver dropped"))
    }
}

impl LapSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn on_local_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        self.forward(LapOrigin::Local, lap)
    }

    fn on_opponent_lap_complete(&mut self, lap: Arc<CompletedLap>) -> anyhow::Result<()> {
        self.forward(LapOrigin::Opponent, lap)
    }
}
