//! Simulation process presence detection

use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::config::PresenceConfig;
use crate::{CaptureError, Result};

/// Lists the names of running processes.
///
/// Implemented for [`SystemProcessEnumerator`] and for any
/// `FnMut() -> Result<Vec<String>>` closure.
pub trait ProcessEnumerator: Send + 'static {
    fn list_running_process_names(&mut self) -> Result<Vec<String>>;
}

impl<F> ProcessEnumerator for F
where
    F: FnMut() -> Result<Vec<String>> + Send + 'static,
{
    fn list_running_process_names(&mut self) -> Result<Vec<String>> {
        self()
    }
}

/// Process enumerator backed by the operating system's process table.
pub struct SystemProcessEnumerator {
    system: System,
}

impl Default for SystemProcessEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessEnumerator {
    pub fn new() -> Self {
        Self { system: System::new() }
    }
}

impl ProcessEnumerator for SystemProcessEnumerator {
    fn list_running_process_names(&mut self) -> Result<Vec<String>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(CaptureError::process_enumeration(
                "process listing is not supported on this platform",
            ));
        }

        self.system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(self
            .system
            .processes()
            .values()
            .map(|process| process.name().to_string_lossy().into_owned())
            .collect())
    }
}

/// Result of one presence poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

impl Presence {
    pub fn is_present(self) -> bool {
        self == Presence::Present
    }
}

/// Decides whether the target simulation is running.
///
/// Only the process list is consulted. A present process is reported absent
/// after `debounce_polls` consecutive absent observations, where a failed
/// enumeration counts as an absent observation. Enumeration runs at most once
/// per `check_interval`; polls in between repeat the last answer.
pub struct PresenceMonitor<E> {
    enumerator: E,
    needle: String,
    check_interval: Duration,
    debounce_polls: u32,
    consecutive_misses: u32,
    current: Presence,
    last_check: Option<Duration>,
}

impl<E: ProcessEnumerator> PresenceMonitor<E> {
    pub fn new(enumerator: E, target_process: &str, config: &PresenceConfig) -> Self {
        Self {
            enumerator,
            needle: target_process.trim().to_lowercase(),
            check_interval: Duration::from_millis(config.check_interval_ms),
            debounce_polls: config.debounce_polls.max(1),
            consecutive_misses: 0,
            current: Presence::Absent,
            last_check: None,
        }
    }

    /// Poll presence at `now` (time since the loop started).
    pub fn poll(&mut self, now: Duration) -> Presence {
        if let Some(last) = self.last_check {
            if now.saturating_sub(last) < self.check_interval {
                return self.current;
            }
        }
        self.last_check = Some(now);

        let observed = match self.enumerator.list_running_process_names() {
            Ok(names) => names.iter().any(|name| self.matches(name)),
            Err(e) => {
                warn!(error = %e, "Process enumeration failed, counting poll as absent");
                false
            }
        };

        if observed {
            if self.current == Presence::Absent {
                info!(target_process = %self.needle, "Simulation process detected");
            }
            self.consecutive_misses = 0;
            self.current = Presence::Present;
        } else {
            self.consecutive_misses = self.consecutive_misses.saturating_add(1);
            if self.current == Presence::Present {
                if self.consecutive_misses >= self.debounce_polls {
                    info!(target_process = %self.needle, "Simulation process lost");
                    self.current = Presence::Absent;
                } else {
                    debug!(
                        misses = self.consecutive_misses,
                        debounce = self.debounce_polls,
                        "Process missing, holding presence"
                    );
                }
            }
        }

        self.current
    }

    /// Last reported presence without polling.
    pub fn current(&self) -> Presence {
        self.current
    }

    fn matches(&self, name: &str) -> bool {
        name.to_lowercase().contains(&self.needle)
    }
}
