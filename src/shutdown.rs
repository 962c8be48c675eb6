//! Cooperative shutdown shared by the monitor and request server threads.
//!
//! The first termination signal moves the process from `Running` to
//! `Draining`; both loops notice at their next timeout boundary and return.
//! A second signal exits immediately.

use std::fmt;
use std::process;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Exit status used when a second signal forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Lifecycle of the server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Both loops keep going.
    Running,
    /// Stop requested; loops finish their current iteration and return.
    Draining,
    /// Both loops have returned.
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => f.write_str("running"),
            RunState::Draining => f.write_str("draining"),
            RunState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Cloneable handle to the shared run state.
#[derive(Debug, Clone)]
pub struct Shutdown {
    state: Arc<Mutex<RunState>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RunState::Running)),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// True until a stop has been requested.
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Request a graceful stop. Returns the state before the request.
    pub fn request_stop(&self) -> RunState {
        let mut state = self.state.lock();
        let previous = *state;
        if previous == RunState::Running {
            *state = RunState::Draining;
        }
        previous
    }

    /// Record that both loops have returned.
    pub fn mark_stopped(&self) {
        *self.state.lock() = RunState::Stopped;
    }

    /// React to a termination signal. The first one requests a drain and
    /// returns `None`; any later one returns the exit status to force.
    pub fn on_signal(&self) -> Option<i32> {
        match self.request_stop() {
            RunState::Running => {
                warn!("closing files and devices, press ctrl-c again to exit");
                None
            }
            _ => Some(FORCED_EXIT_CODE),
        }
    }

    /// Route SIGINT, SIGTERM and SIGHUP to [`Shutdown::on_signal`].
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            if let Some(code) = shutdown.on_signal() {
                process::exit(code);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_drains() {
        let shutdown = Shutdown::new();
        assert!(shutdown.is_running());

        assert_eq!(shutdown.request_stop(), RunState::Running);
        assert_eq!(shutdown.state(), RunState::Draining);
        assert!(!shutdown.is_running());
    }

    #[test]
    fn test_repeated_request_reports_draining() {
        let shutdown = Shutdown::new();
        shutdown.request_stop();
        assert_eq!(shutdown.request_stop(), RunState::Draining);
        assert_eq!(shutdown.state(), RunState::Draining);
    }

    #[test]
    fn test_second_signal_forces_exit() {
        let shutdown = Shutdown::new();

        assert_eq!(shutdown.on_signal(), None);
        assert_eq!(shutdown.state(), RunState::Draining);

        assert_eq!(shutdown.on_signal(), Some(FORCED_EXIT_CODE));
        assert_eq!(shutdown.on_signal(), Some(130));
        assert_eq!(shutdown.state(), RunState::Draining);
    }

    #[test]
    fn signal_after_stop_forces_exit() {
        let shutdown = Shutdown::new();
        shutdown.mark_stopped();
        assert_eq!(shutdown.on_signal(), Some(FORCED_EXIT_CODE));
    }

    #[test]
    fn clones_share_state() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        other.request_stop();
        assert!(!shutdown.is_running());

        shutdown.mark_stopped();
        assert_eq!(other.state(), RunState::Stopped);
        assert_eq!(other.request_stop(), RunState::Stopped);
    }
}
