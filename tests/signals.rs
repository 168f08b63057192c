// Starts the `pgtestkit` binary against a real server and signals it.
// To run these tests: cargo test --features postgres_tests
#![cfg(all(feature = "postgres_tests", unix))]

//! Termination signals stop the server and clean up before the process exits

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};

fn spawn_serve(runtime_dir: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_pgtestkit"))
        .arg("serve")
        .env("PGTESTKIT_RUNTIME_DIR", runtime_dir)
        .env("PGTESTKIT_LOCALE", "C")
        .env_remove("PGTESTKIT_CONFIG")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn pgtestkit serve")
}

fn send_signal(child: &Child, signal: &str) {
    let status = Command::new("kill")
        .args([signal, &child.id().to_string()])
        .status()
        .expect("failed to run kill");
    assert!(status.success());
}

fn wait_until_serving(child: &mut Child) -> String {
    let stdout = child.stdout.take().expect("stdout is piped");
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line).expect("read connection string");
    line.trim().to_string()
}

#[test]
fn test_sigterm_stops_server_and_removes_cache_dir() {
    let runtime_dir =
        std::env::temp_dir().join(format!("pgtestkit-sig-{}", uuid::Uuid::new_v4().simple()));
    let mut child = spawn_serve(&runtime_dir);

    let url = wait_until_serving(&mut child);
    assert!(url.starts_with("postgres://"), "unexpected output: {url:?}");
    assert!(runtime_dir.join("data").exists());

    send_signal(&child, "-TERM");
    let status = child.wait().unwrap();

    assert_eq!(status.code(), Some(143));
    assert!(!runtime_dir.exists(), "cache directory must be removed before exit");
}

#[test]
fn test_sigint_exits_with_130() {
    let runtime_dir =
        std::env::temp_dir().join(format!("pgtestkit-sig-{}", uuid::Uuid::new_v4().simple()));
    let mut child = spawn_serve(&runtime_dir);
    wait_until_serving(&mut child);

    send_signal(&child, "-INT");
    let status = child.wait().unwrap();

    assert_eq!(status.code(), Some(130));
    assert!(!runtime_dir.exists());
}
