//! Driver runs a capture loop on its own tokio task

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, trace};

use crate::capture::{CaptureLoop, LoopStatus};
use crate::presence::ProcessEnumerator;
use crate::source::SampleSource;
use crate::stream::ThrottleExt;
use crate::types::StatusRate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
}

/// Spawns the capture task.
///
/// The task owns the [`CaptureLoop`], ticks it at `poll_interval_ms` and
/// publishes every [`LoopStatus`] on a watch channel. Cancellation is checked
/// between ticks only; a tick that has started always runs to the end.
pub struct CaptureDriver;

impl CaptureDriver {
    /// Start `capture` and run it until the returned handle is stopped or dropped.
    pub fn spawn<S, E>(capture: CaptureLoop<S, E>) -> CaptureHandle<S, E>
    where
        S: SampleSource,
        E: ProcessEnumerator,
    {
        let (status_tx, status_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let poll_hz = capture.config().poll_hz();

        let cancel_task = cancel.clone();
        let task = tokio::spawn(async move {
            Self::capture_task(capture, status_tx, command_rx, cancel_task).await
        });

        CaptureHandle {
            status: status_rx,
            commands: command_tx,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
            poll_hz,
        }
    }

    async fn capture_task<S, E>(
        mut capture: CaptureLoop<S, E>,
        status_tx: watch::Sender<Option<Arc<LoopStatus>>>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) -> CaptureLoop<S, E>
    where
        S: SampleSource,
        E: ProcessEnumerator,
    {
        let period = capture.config().poll_interval();
        info!(?period, "Capture task started");
        capture.start();

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        loop {
            if cancel.is_cancelled() {
                info!("Capture task cancelled");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Capture task cancelled while waiting for tick");
                    break;
                }
                Some(command) = commands.recv() => {
                    debug!(?command, "Capture command");
                    match command {
                        Command::Pause => capture.pause(),
                        Command::Resume => capture.resume(),
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let status = capture.run_once().await;
            ticks += 1;
            trace!(
                tick = status.tick,
                lap = ?status.current_lap,
                state = ?status.local_state,
                diagnostics = status.diagnostics.len(),
                "Tick"
            );

            if status_tx.send(Some(Arc::new(status))).is_err() {
                debug!("Status receiver dropped, shutting down");
                break;
            }
        }

        capture.stop();
        info!(ticks, "Capture task ended");
        capture
    }
}

/// Control surface for a spawned capture loop.
///
/// Dropping the handle cancels the task.
pub struct CaptureHandle<S, E> {
    status: watch::Receiver<Option<Arc<LoopStatus>>>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    /// Cancels the task when the handle goes away
    _guard: DropGuard,
    task: JoinHandle<CaptureLoop<S, E>>,
    poll_hz: f64,
}

impl<S, E> CaptureHandle<S, E> {
    /// Ask the task to stop after the current tick.
    pub fn stop(&self) {
        debug!("Capture stop requested");
        self.cancel.cancel();
    }

    /// Returns false if the task has already ended.
    pub fn pause(&self) -> bool {
        self.commands.send(Command::Pause).is_ok()
    }

    /// Returns false if the task has already ended.
    pub fn resume(&self) -> bool {
        self.commands.send(Command::Resume).is_ok()
    }

    /// Status of the most recent tick, `None` before the first one.
    pub fn status(&self) -> Option<Arc<LoopStatus>> {
        self.status.borrow().clone()
    }

    /// Stream of tick statuses, starting with the latest one.
    ///
    /// Below the poll rate the stream is throttled latest-wins, except that a
    /// status that emitted a lap or changed the loop state is delivered as
    /// soon as it is seen.
    pub fn status_updates(
        &self,
        rate: StatusRate,
    ) -> impl Stream<Item = Arc<LoopStatus>> + Send + 'static {
        let statuses = WatchStream::new(self.status.clone()).filter_map(|opt| async move { opt });

        match rate.throttle_interval(self.poll_hz) {
            None => statuses.boxed(),
            Some(interval) => {
                statuses.throttle_urgent(interval, |status: &Arc<LoopStatus>| status.is_urgent()).boxed()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and hand back the capture loop.
    pub async fn join(self) -> Result<CaptureLoop<S, E>, JoinError> {
        let CaptureHandle { task, _guard, .. } = self;
        drop(_guard);
        task.await.inspect_err(|e| error!(error = %e, "Capture task failed"))
    }
}
