//! In-memory backend, admin client and connector for unit tests.

use crate::config::ServerConfig;
use crate::connector::Connector;
use crate::errors::{PgTestKitError, Result};
use crate::server::{AdminClient, Backend, LaunchSettings, ServerProcess};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configuration pointing at a fresh, not yet created runtime directory
pub(crate) fn test_config() -> ServerConfig {
    let runtime_dir = std::env::temp_dir()
        .join(format!("pgtestkit-test-{}", uuid::Uuid::new_v4().simple()));
    ServerConfig { runtime_dir: Some(runtime_dir), handle_signals: false, ..Default::default() }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct BackendStats {
    pub launches: usize,
    pub stops: usize,
    pub admin_closes: usize,
    pub last_port: Option<u16>,
}

#[derive(Debug, Default)]
struct BackendOptions {
    launch_delay: Option<Duration>,
    launch_failure: Option<String>,
    admin_connect_fails: bool,
    ping_fails: bool,
    stop_fails: bool,
    admin_close_fails: bool,
}

struct BackendInner {
    options: Mutex<BackendOptions>,
    stats: Mutex<BackendStats>,
    admin: FakeAdmin,
}

/// Backend that pretends to run a server
#[derive(Clone)]
pub(crate) struct FakeBackend {
    inner: Arc<BackendInner>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BackendInner {
                options: Mutex::new(BackendOptions::default()),
                stats: Mutex::new(BackendStats::default()),
                admin: FakeAdmin::new(),
            }),
        }
    }

    fn configure(self, f: impl FnOnce(&mut BackendOptions)) -> Self {
        f(&mut self.inner.options.lock().unwrap());
        self
    }

    pub fn with_launch_delay(self, delay: Duration) -> Self {
        self.configure(|o| o.launch_delay = Some(delay))
    }

    pub fn failing_launch(self, message: &str) -> Self {
        let message = message.to_string();
        self.configure(|o| o.launch_failure = Some(message))
    }

    pub fn failing_admin_connect(self) -> Self {
        self.configure(|o| o.admin_connect_fails = true)
    }

    pub fn failing_ping(self) -> Self {
        self.configure(|o| o.ping_fails = true)
    }

    pub fn failing_stop(self) -> Self {
        self.configure(|o| o.stop_fails = true)
    }

    pub fn failing_admin_close(self) -> Self {
        self.configure(|o| o.admin_close_fails = true)
    }

    pub fn stats(&self) -> BackendStats {
        let mut stats = self.inner.stats.lock().unwrap().clone();
        stats.admin_closes = self.inner.admin.state.lock().unwrap().closes;
        stats
    }

    pub fn admin(&self) -> FakeAdmin {
        self.inner.admin.clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn launch(&self, settings: &LaunchSettings) -> Result<Box<dyn ServerProcess>> {
        let (delay, failure, stop_fails) = {
            let options = self.inner.options.lock().unwrap();
            (options.launch_delay, options.launch_failure.clone(), options.stop_fails)
        };
        {
            let mut stats = self.inner.stats.lock().unwrap();
            stats.launches += 1;
            stats.last_port = Some(settings.port);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(PgTestKitError::process(message));
        }
        Ok(Box::new(FakeProcess { inner: Arc::clone(&self.inner), stop_fails }))
    }

    async fn connect_admin(&self, _url: &str) -> Result<Box<dyn AdminClient>> {
        let (connect_fails, ping_fails, close_fails) = {
            let options = self.inner.options.lock().unwrap();
            (options.admin_connect_fails, options.ping_fails, options.admin_close_fails)
        };
        if connect_fails {
            return Err(PgTestKitError::process("connection refused"));
        }
        {
            let mut state = self.inner.admin.state.lock().unwrap();
            state.ping_fails = ping_fails;
            state.close_fails = close_fails;
        }
        Ok(Box::new(self.inner.admin.clone()))
    }
}

struct FakeProcess {
    inner: Arc<BackendInner>,
    stop_fails: bool,
}

#[async_trait]
impl ServerProcess for FakeProcess {
    async fn stop(&mut self) -> Result<()> {
        self.inner.stats.lock().unwrap().stops += 1;
        if self.stop_fails {
            return Err(PgTestKitError::process("pg_ctl stop failed"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AdminState {
    databases: BTreeSet<String>,
    created: Vec<String>,
    terminated: Vec<String>,
    closes: usize,
    ping_fails: bool,
    close_fails: bool,
    drop_fails: bool,
    terminate_fails: bool,
}

/// Administrative client keeping databases in a set
#[derive(Clone)]
pub(crate) struct FakeAdmin {
    state: Arc<Mutex<AdminState>>,
}

impl FakeAdmin {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AdminState {
                databases: BTreeSet::from(["postgres".to_string()]),
                created: Vec::new(),
                terminated: Vec::new(),
                closes: 0,
                ping_fails: false,
                close_fails: false,
                drop_fails: false,
                terminate_fails: false,
            })),
        }
    }

    pub fn databases(&self) -> Vec<String> {
        self.state.lock().unwrap().databases.iter().cloned().collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.state.lock().unwrap().terminated.clone()
    }

    pub fn insert_database(&self, name: &str) {
        self.state.lock().unwrap().databases.insert(name.to_string());
    }

    pub fn fail_drops(&self) {
        self.state.lock().unwrap().drop_fails = true;
    }

    pub fn fail_terminations(&self) {
        self.state.lock().unwrap().terminate_fails = true;
    }
}

#[async_trait]
impl AdminClient for FakeAdmin {
    async fn ping(&self) -> Result<()> {
        if self.state.lock().unwrap().ping_fails {
            return Err(PgTestKitError::process("ping timed out"));
        }
        Ok(())
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().databases.contains(name))
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.databases.insert(name.to_string());
        state.created.push(name.to_string());
        Ok(())
    }

    async fn database_present(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().databases.contains(name))
    }

    async fn terminate_backends(&self, name: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.terminate_fails {
            return Err(PgTestKitError::process("terminate failed"));
        }
        state.terminated.push(name.to_string());
        Ok(0)
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.drop_fails {
            return Err(PgTestKitError::process(format!("database {} is being accessed", name)));
        }
        state.databases.remove(name);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        if state.close_fails {
            return Err(PgTestKitError::process("close failed"));
        }
        Ok(())
    }
}

/// Connector that records calls and hands back the connection string
pub(crate) struct RecordingConnector {
    calls: Arc<Mutex<Vec<&'static str>>>,
    fail_connect: bool,
    fail_reset: Arc<AtomicBool>,
    fail_close: bool,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_connect: false,
            fail_reset: Arc::new(AtomicBool::new(false)),
            fail_close: false,
        }
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_reset(self) -> Self {
        self.fail_reset.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }

    /// Toggle reset failures after the handle was created
    pub fn reset_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_reset)
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    type Client = String;

    async fn connect(&mut self, connection_string: &str) -> Result<String> {
        self.calls.lock().unwrap().push("connect");
        if self.fail_connect {
            return Err(PgTestKitError::connector("connect refused"));
        }
        Ok(connection_string.to_string())
    }

    async fn close(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("close");
        if self.fail_close {
            return Err(PgTestKitError::connector("close failed"));
        }
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("reset");
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(PgTestKitError::connector("reset failed"));
        }
        Ok(())
    }
}
