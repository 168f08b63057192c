//! Test-suite entry point.

use crate::server::TestServer;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Exit status used when the server cannot be started or stopped cleanly
pub const LIFECYCLE_FAILURE_EXIT_CODE: i32 = 1;

/// Start `server`, run `suite` against it, stop it and return the exit code.
///
/// A failed start skips the suite. A failed stop turns a passing run into a
/// failure but never masks a failing one.
///
/// ```no_run
/// # async fn example() {
/// use pgtestkit::{harness::run_suite, ServerConfig, TestServer};
///
/// let server = TestServer::new(ServerConfig::default());
/// let code = run_suite(server, |_server| async { 0 }).await;
/// std::process::exit(code);
/// # }
/// ```
pub async fn run_suite<F, Fut>(server: Arc<TestServer>, suite: F) -> i32
where
    F: FnOnce(Arc<TestServer>) -> Fut,
    Fut: Future<Output = i32>,
{
    if let Err(e) = server.start().await {
        error!(error = %e, "Failed to start PostgreSQL server");
        return LIFECYCLE_FAILURE_EXIT_CODE;
    }

    let code = suite(Arc::clone(&server)).await;
    info!(exit_code = code, "Test suite finished");

    match server.stop().await {
        Ok(()) => code,
        Err(e) => {
            error!(error = %e, "Failed to stop PostgreSQL server");
            if code == 0 {
                LIFECYCLE_FAILURE_EXIT_CODE
            } else {
                code
            }
        }
    }
}
