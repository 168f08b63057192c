//! # Server Lifecycle
//!
//! [`TestServer`] owns the one PostgreSQL server a test run shares. It is
//! constructed once, handed around as `Arc<TestServer>`, and guarantees:
//!
//! - the start sequence runs at most once; concurrent callers wait for it and
//!   all observe the same outcome,
//! - a stopped server never starts again,
//! - stop is idempotent and attempts every cleanup step even when earlier
//!   ones fail.
//!
//! Nothing the server holds is tied to the runtime that started it. One
//! `static` server can be shared by many `#[tokio::test]` functions even
//! though each of them runs on its own runtime.

pub mod admin;
pub mod process;
pub mod state;

pub use admin::{AdminClient, PgAdmin};
pub use process::{Backend, EmbeddedBackend, EmbeddedProcess, LaunchSettings, ServerProcess};
pub use state::ServerPhase;

use crate::config::ServerConfig;
use crate::errors::{ErrorContext, PgTestKitError, Result};
use crate::provisioner::naming::connection_string;
use crate::shutdown::{self, ShutdownAction};
use state::{CacheDir, ServerState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

/// Directory under the user's home holding per-run cache directories
pub const CACHE_ROOT_DIR: &str = ".pgtestkit";

/// Shared outcome of the one-time start
type StartOutcome = std::result::Result<(), Arc<PgTestKitError>>;

/// Lifecycle owner of an ephemeral PostgreSQL server
pub struct TestServer {
    config: ServerConfig,
    backend: Arc<dyn Backend>,
    start_outcome: OnceCell<StartOutcome>,
    state: Mutex<ServerState>,
    signal_listener_installed: AtomicBool,
}

impl TestServer {
    /// Create a lifecycle object backed by `postgresql_embedded`
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_backend(config, EmbeddedBackend)
    }

    /// Create a lifecycle object with a custom process backend
    pub fn with_backend<B: Backend>(config: ServerConfig, backend: B) -> Arc<Self> {
        Arc::new(Self {
            config,
            backend: Arc::new(backend),
            start_outcome: OnceCell::new(),
            state: Mutex::new(ServerState::new()),
            signal_listener_installed: AtomicBool::new(false),
        })
    }

    /// Start the server.
    ///
    /// The start sequence runs exactly once per `TestServer`. Callers that
    /// arrive while it runs wait for it; every caller gets the same result.
    /// Fails with [`PgTestKitError::ServerAlreadyStopped`] after a stop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.state.lock().await.phase == ServerPhase::Stopped {
            warn!("Start requested after the server was stopped");
            return Err(PgTestKitError::ServerAlreadyStopped);
        }

        let outcome = self.start_outcome.get_or_init(|| self.start_once()).await;

        match outcome {
            Ok(()) => {
                // a stop may have completed between the check above and now
                if self.state.lock().await.phase == ServerPhase::Stopped {
                    return Err(PgTestKitError::ServerAlreadyStopped);
                }
                Ok(())
            }
            Err(source) => Err(PgTestKitError::StartFailed { source: Arc::clone(source) }),
        }
    }

    async fn start_once(self: &Arc<Self>) -> StartOutcome {
        let mut state = self.state.lock().await;
        info!("Starting embedded PostgreSQL server");
        state.phase = ServerPhase::Starting;

        if let Err(e) = self.launch(&mut state).await {
            state.phase = ServerPhase::Failed;
            error!(error = %e, "Failed to start PostgreSQL server");
            return Err(Arc::new(e));
        }

        state.phase = ServerPhase::Running;
        info!(port = state.port, "PostgreSQL server started");
        drop(state);

        if self.config.handle_signals {
            self.install_signal_listener().await;
        }
        Ok(())
    }

    /// Run the start sequence, rolling back everything opened so far on failure
    async fn launch(&self, state: &mut ServerState) -> Result<()> {
        let (port, reservation) = match self.config.port {
            Some(port) => (port, None),
            None => {
                let reservation = PortReservation::acquire()?;
                (reservation.port(), Some(reservation))
            }
        };

        let cache_dir = self.prepare_cache_dir(port).await?;
        let settings = LaunchSettings::resolve(&self.config, port, cache_dir.path.clone());

        // release the port right before the server binds it
        drop(reservation);

        let mut process = match self.backend.launch(&settings).await {
            Ok(process) => process,
            Err(e) => {
                self.discard_cache_dir(&cache_dir).await;
                return Err(e);
            }
        };

        let url = connection_string(
            &self.config.username,
            &self.config.password,
            port,
            &self.config.database,
        );
        let admin = match self.backend.connect_admin(&url).await {
            Ok(admin) => admin,
            Err(e) => {
                if let Err(stop_err) = process.stop().await {
                    error!(
                        error = %stop_err,
                        "Failed to stop PostgreSQL server after connection error"
                    );
                }
                self.discard_cache_dir(&cache_dir).await;
                return Err(e);
            }
        };

        if let Err(e) = admin.ping().await {
            if let Err(close_err) = admin.close().await {
                error!(error = %close_err, "Failed to close database connection");
            }
            if let Err(stop_err) = process.stop().await {
                error!(error = %stop_err, "Failed to stop PostgreSQL server after ping error");
            }
            self.discard_cache_dir(&cache_dir).await;
            return Err(e);
        }

        debug!(port, "Successfully connected to PostgreSQL server");
        state.port = port;
        state.cache_dir = Some(cache_dir);
        state.admin = Some(admin);
        state.process = Some(process);
        Ok(())
    }

    async fn prepare_cache_dir(&self, port: u16) -> Result<CacheDir> {
        let keep = self.config.keep_cache_dir;
        match &self.config.runtime_dir {
            Some(dir) => claim_runtime_dir(dir.clone(), keep).await,
            None => fresh_cache_dir(default_cache_dir(port), keep).await,
        }
    }

    async fn discard_cache_dir(&self, cache_dir: &CacheDir) {
        if let Err(e) = remove_cache_dir(cache_dir).await {
            error!(error = %e, "Failed to remove cache directory after start failure");
        }
    }

    async fn install_signal_listener(self: &Arc<Self>) {
        if self.signal_listener_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Installing termination signal listener");
        let installed = shutdown::spawn_shutdown_thread(
            Arc::downgrade(self),
            shutdown::listen_for_termination,
            ShutdownAction::Exit,
        )
        .await;
        if let Err(e) = installed {
            warn!(error = %e, "Failed to install termination signal listener");
        }
    }

    /// Stop the server and release everything it holds.
    ///
    /// A no-op when the server is not running. Otherwise closes the
    /// administrative connection, stops the process, marks the server
    /// stopped (even if stopping failed) and removes the cache directory.
    /// Every failure is reported in one aggregated error.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        info!("Stopping PostgreSQL server");

        if !state.phase.is_running() {
            debug!(phase = %state.phase, "PostgreSQL server is not running or already stopped");
            return Ok(());
        }

        state.phase = ServerPhase::Stopping;
        let mut errors = Vec::new();

        if let Some(admin) = state.admin.take() {
            debug!("Closing base database connection");
            if let Err(e) = admin.close().await.context("Failed to close base database connection")
            {
                error!(error = %e, "Failed to close base database connection");
                errors.push(e);
            }
        }

        if let Some(mut process) = state.process.take() {
            debug!("Stopping PostgreSQL server process");
            match process.stop().await {
                Ok(()) => info!("Successfully stopped PostgreSQL server"),
                Err(e) => {
                    error!(error = %e, "Failed to stop PostgreSQL server");
                    errors.push(e);
                }
            }
        }

        state.phase = ServerPhase::Stopped;

        if let Some(cache_dir) = state.cache_dir.take() {
            match remove_cache_dir(&cache_dir).await {
                Ok(()) => debug!(path = %cache_dir.path.display(), "Cache directory handled"),
                Err(e) => {
                    error!(
                        path = %cache_dir.path.display(),
                        error = %e,
                        "Failed to remove cache directory"
                    );
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            info!("Successfully stopped PostgreSQL server and cleaned up all resources");
        }
        PgTestKitError::teardown("stopping PostgreSQL", errors)
    }

    /// Shutdown trigger for hosts (signal handlers, harnesses, drop guards).
    ///
    /// Equivalent to [`stop`](Self::stop).
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await
    }

    /// Configuration this server was created with
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> ServerPhase {
        self.state.lock().await.phase
    }

    /// Whether databases can be provisioned right now
    pub async fn is_running(&self) -> bool {
        self.phase().await.is_running()
    }

    /// Listening port while running
    pub async fn port(&self) -> Option<u16> {
        let state = self.state.lock().await;
        state.phase.is_running().then_some(state.port)
    }

    /// Per-run cache directory while running
    pub async fn cache_dir(&self) -> Option<PathBuf> {
        self.state.lock().await.cache_dir.as_ref().map(|dir| dir.path.clone())
    }

    /// Connection string for `database` on the running server
    pub async fn connection_string(&self, database: &str) -> Result<String> {
        let port = self.port().await.ok_or(PgTestKitError::ServerNotRunning)?;
        Ok(connection_string(&self.config.username, &self.config.password, port, database))
    }

    /// Connection string for the maintenance database
    pub async fn admin_connection_string(&self) -> Result<String> {
        self.connection_string(&self.config.database).await
    }

    pub(crate) fn state(&self) -> &Mutex<ServerState> {
        &self.state
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.phase.is_running() {
            return;
        }

        warn!(
            port = state.port,
            "TestServer dropped while running; releasing without a clean stop"
        );
        state.admin = None;
        state.process = None;
        state.phase = ServerPhase::Stopped;

        if let Some(cache_dir) = state.cache_dir.take() {
            if cache_dir.remove_on_stop {
                if let Err(e) = std::fs::remove_dir_all(&cache_dir.path) {
                    warn!(
                        path = %cache_dir.path.display(),
                        error = %e,
                        "Failed to remove cache directory on drop"
                    );
                }
            }
        }
    }
}

/// `~/.pgtestkit/postgres_<port>`, falling back to the temp directory without a home
pub fn default_cache_dir(port: u16) -> PathBuf {
    let root = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    root.join(CACHE_ROOT_DIR).join(format!("{}_{}", crate::config::DEFAULT_DATABASE, port))
}

/// Use a caller-supplied directory; it is removed on stop only if this run created it
async fn claim_runtime_dir(path: PathBuf, keep: bool) -> Result<CacheDir> {
    let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
    create_dir(&path).await?;
    Ok(CacheDir { path, remove_on_stop: !existed && !keep })
}

/// Recreate the per-port default directory empty; a leftover from a killed run is discarded
async fn fresh_cache_dir(path: PathBuf, keep: bool) -> Result<CacheDir> {
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        warn!(path = %path.display(), "Removing stale cache directory from an earlier run");
        remove_dir_if_present(&path).await?;
    }
    create_dir(&path).await?;
    Ok(CacheDir { path, remove_on_stop: !keep })
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        PgTestKitError::io(e, format!("Failed to create cache directory {}", path.display()))
    })
}

async fn remove_cache_dir(cache_dir: &CacheDir) -> Result<()> {
    if !cache_dir.remove_on_stop {
        debug!(path = %cache_dir.path.display(), "Keeping cache directory");
        return Ok(());
    }
    remove_dir_if_present(&cache_dir.path).await
}

async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PgTestKitError::io(
            e,
            format!("Failed to remove cache directory {}", path.display()),
        )),
    }
}

/// A free local port, held until dropped
enum PortReservation {
    Crate(reserve_port::ReservedPort),
    Listener(std::net::TcpListener),
}

impl PortReservation {
    fn acquire() -> Result<Self> {
        match reserve_port::ReservedPort::random() {
            Ok(reserved) => Ok(Self::Crate(reserved)),
            Err(e) => {
                debug!(error = ?e, "Port reservation failed; falling back to binding port 0");
                let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
                    .map_err(|e| PgTestKitError::io(e, "Failed to get free port"))?;
                Ok(Self::Listener(listener))
            }
        }
    }

    fn port(&self) -> u16 {
        match self {
            Self::Crate(reserved) => reserved.port(),
            Self::Listener(listener) => listener.local_addr().map(|a| a.port()).unwrap_or(0),
        }
    }
}
