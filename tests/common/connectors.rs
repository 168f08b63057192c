//! Pool connector wrapper that records calls and injects failures.

#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use pgtestkit::{Connector, PgPoolConnector, PgTestKitError, Result};
use sqlx::PgPool;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nothing,
    Connect,
    Reset,
}

pub struct RecordingConnector {
    inner: PgPoolConnector,
    fail_at: FailAt,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::failing_at(FailAt::Nothing)
    }

    pub fn failing_at(fail_at: FailAt) -> Self {
        Self { inner: PgPoolConnector::new(), fail_at, calls: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    type Client = PgPool;

    async fn connect(&mut self, connection_string: &str) -> Result<PgPool> {
        self.record("connect");
        if self.fail_at == FailAt::Connect {
            return Err(PgTestKitError::connector("injected connect failure"));
        }
        self.inner.connect(connection_string).await
    }

    async fn close(&mut self) -> Result<()> {
        self.record("close");
        self.inner.close().await
    }

    async fn reset(&mut self) -> Result<()> {
        self.record("reset");
        if self.fail_at == FailAt::Reset {
            return Err(PgTestKitError::connector("injected reset failure"));
        }
        self.inner.reset().await
    }
}
