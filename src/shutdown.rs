//! Signal-driven shutdown.
//!
//! After the first successful start the server installs one listener that
//! waits for SIGINT/SIGTERM, runs the regular stop path and exits the process
//! with `128 + signo`. The listener runs on its own OS thread with a
//! current-thread runtime, so it outlives the runtime that called `start`
//! (each `#[tokio::test]` builds and drops its own).

use crate::server::TestServer;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

const LISTENER_THREAD_NAME: &str = "pgtestkit-shutdown";

/// Signal that ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl TerminationSignal {
    /// Conventional shell exit status for a process killed by this signal
    pub fn exit_code(self) -> i32 {
        match self {
            TerminationSignal::Interrupt => 130,
            TerminationSignal::Terminate => 143,
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// What the listener does once the server is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAction {
    /// Terminate the process with the signal's exit code
    Exit,
    /// Return the signal from the listener thread
    Return,
}

/// Registered SIGINT/SIGTERM handlers.
///
/// Must be created inside a runtime; signals delivered after `install`
/// returns are never lost.
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next termination signal
    pub async fn recv(&mut self) -> io::Result<TerminationSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => Ok(TerminationSignal::Interrupt),
                _ = self.terminate.recv() => Ok(TerminationSignal::Terminate),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok(TerminationSignal::Interrupt)
        }
    }
}

/// Wait for SIGINT or SIGTERM
pub async fn termination_signal() -> io::Result<TerminationSignal> {
    TerminationSignals::install()?.recv().await
}

/// Register the signal handlers and return a future resolving on the first signal
pub fn listen_for_termination(
) -> io::Result<impl Future<Output = io::Result<TerminationSignal>> + 'static> {
    let mut signals = TerminationSignals::install()?;
    Ok(async move { signals.recv().await })
}

/// Start a listener thread that stops `server` once the trigger resolves.
///
/// `install` runs on the listener thread inside its runtime and produces the
/// trigger; this function returns only after it has succeeded. The listener
/// holds a weak reference, so it never keeps a dropped server alive.
pub async fn spawn_shutdown_thread<I, F>(
    server: Weak<TestServer>,
    install: I,
    action: ShutdownAction,
) -> io::Result<JoinHandle<Option<TerminationSignal>>>
where
    I: FnOnce() -> io::Result<F> + Send + 'static,
    F: Future<Output = io::Result<TerminationSignal>> + 'static,
{
    let (ready_tx, ready_rx) = oneshot::channel::<io::Result<()>>();

    let handle = thread::Builder::new().name(LISTENER_THREAD_NAME.to_string()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return None;
            }
        };

        let trigger = {
            let _guard = runtime.enter();
            match install() {
                Ok(trigger) => trigger,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return None;
                }
            }
        };
        let _ = ready_tx.send(Ok(()));

        runtime.block_on(wait_and_stop(server, trigger, action))
    })?;

    match ready_rx.await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::other("shutdown listener exited during setup")),
    }
}

async fn wait_and_stop<F>(
    server: Weak<TestServer>,
    trigger: F,
    action: ShutdownAction,
) -> Option<TerminationSignal>
where
    F: Future<Output = io::Result<TerminationSignal>>,
{
    let signal = match trigger.await {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "Termination signal listener failed");
            return None;
        }
    };

    info!(signal = %signal, "Received termination signal, shutting down");
    if let Some(server) = server.upgrade() {
        if let Err(e) = server.shutdown().await {
            error!(error = %e, "Failed to stop PostgreSQL server on signal");
        }
    }

    if action == ShutdownAction::Exit {
        std::process::exit(signal.exit_code());
    }
    Some(signal)
}
