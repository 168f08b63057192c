//! Lifecycle state owned by [`TestServer`](super::TestServer).

use crate::server::admin::AdminClient;
use crate::server::process::ServerProcess;
use std::fmt;
use std::path::PathBuf;

/// Phase of the server lifecycle.
///
/// `NotStarted -> Starting -> Running -> Stopping -> Stopped`. `Stopped` is
/// terminal. A failed start lands in `Failed`, which reports like
/// `NotStarted` but can never start again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ServerPhase {
    /// Whether databases may be provisioned in this phase
    pub fn is_running(self) -> bool {
        matches!(self, ServerPhase::Running)
    }

    /// Whether the phase can never reach `Running` again
    pub fn is_terminal(self) -> bool {
        matches!(self, ServerPhase::Stopped | ServerPhase::Failed)
    }
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerPhase::NotStarted => "not_started",
            ServerPhase::Starting => "starting",
            ServerPhase::Running => "running",
            ServerPhase::Stopping => "stopping",
            ServerPhase::Stopped => "stopped",
            ServerPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-run cache directory and whether stop deletes it
#[derive(Debug, Clone)]
pub(crate) struct CacheDir {
    pub(crate) path: PathBuf,
    pub(crate) remove_on_stop: bool,
}

/// Fields guarded by the lifecycle mutex.
///
/// Invariant: `phase == Running` implies `admin.is_some()`,
/// `process.is_some()` and `port > 0`.
pub(crate) struct ServerState {
    pub(crate) phase: ServerPhase,
    pub(crate) port: u16,
    pub(crate) cache_dir: Option<CacheDir>,
    pub(crate) admin: Option<Box<dyn AdminClient>>,
    pub(crate) process: Option<Box<dyn ServerProcess>>,
}

impl ServerState {
    pub(crate) fn new() -> Self {
        Self {
            phase: ServerPhase::NotStarted,
            port: 0,
            cache_dir: None,
            admin: None,
            process: None,
        }
    }

    /// Administrative client, if the server is running
    pub(crate) fn running_admin(&self) -> Option<&dyn AdminClient> {
        if self.phase.is_running() {
            self.admin.as_deref()
        } else {
            None
        }
    }
}
