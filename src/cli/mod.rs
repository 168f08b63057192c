//! # Command Line Interface
//!
//! `pgtestkit exec -- <command>` runs a test command against a freshly
//! started server; `pgtestkit serve` keeps a server up until interrupted.

use crate::config::{LoggingConfig, ServerConfig};
use crate::observability::{init_logging, log_config_info};
use crate::server::TestServer;
use crate::shutdown::termination_signal;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pgtestkit")]
#[command(about = "Ephemeral PostgreSQL servers for test suites")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML); `PGTESTKIT_*` variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Port override
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a server, run a command with DATABASE_URL set, then stop the server
    Exec {
        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Start a server and keep it running until SIGINT/SIGTERM
    Serve,
}

/// Parse arguments, run the command and return the process exit code
pub async fn run_cli() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    initialise_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(Some(path))?,
        None => ServerConfig::from_env()?,
    };
    if let Some(port) = cli.port {
        config.port = Some(port);
    }
    // exec waits for signals itself so it can stop the child first
    if matches!(cli.command, Commands::Exec { .. }) {
        config.handle_signals = false;
    }
    log_config_info(&config);

    let server = TestServer::new(config);

    match cli.command {
        Commands::Exec { command } => handle_exec(&server, command).await,
        Commands::Serve => handle_serve(&server).await,
    }
}

fn initialise_logging(verbose: bool) {
    let mut logging = LoggingConfig::from_env();
    if verbose {
        logging.enabled = true;
        logging.level = "debug".to_string();
    }
    init_logging(&logging);
}

/// Variables exported to the child process
async fn child_environment(server: &TestServer) -> anyhow::Result<Vec<(&'static str, String)>> {
    let config = server.config();
    let port = server.port().await.context("server is not running")?;
    Ok(vec![
        ("DATABASE_URL", server.admin_connection_string().await?),
        ("PGHOST", "localhost".to_string()),
        ("PGPORT", port.to_string()),
        ("PGUSER", config.username.clone()),
        ("PGPASSWORD", config.password.clone()),
        ("PGDATABASE", config.database.clone()),
    ])
}

async fn handle_exec(server: &Arc<TestServer>, command: Vec<String>) -> anyhow::Result<i32> {
    let (program, args) = command.split_first().context("no command given")?;

    server.start().await.context("failed to start PostgreSQL")?;

    let outcome = run_child(server, program, args).await;

    if let Err(e) = server.stop().await {
        error!(error = %e, "Failed to stop PostgreSQL server");
        if matches!(outcome, Ok(0)) {
            return Ok(1);
        }
    }
    outcome
}

async fn run_child(server: &TestServer, program: &str, args: &[String]) -> anyhow::Result<i32> {
    let env = child_environment(server).await?;
    info!(program = %program, "Running command");

    let mut child = Command::new(program)
        .args(args)
        .envs(env)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to run {}", program))?;

    let signal = tokio::select! {
        status = child.wait() => {
            let status = status.context("failed to wait for command")?;
            info!(status = %status, "Command finished");
            return Ok(status.code().unwrap_or(1));
        }
        signal = termination_signal() => signal.context("failed to install signal handler")?,
    };

    info!(signal = %signal, "Received signal, stopping command");
    if let Err(e) = child.kill().await {
        error!(error = %e, "Failed to kill command");
    }
    Ok(signal.exit_code())
}

async fn handle_serve(server: &Arc<TestServer>) -> anyhow::Result<i32> {
    server.start().await.context("failed to start PostgreSQL")?;

    println!("{}", server.admin_connection_string().await?);
    if let Some(dir) = server.cache_dir().await {
        eprintln!("cache directory: {}", dir.display());
    }

    // with handle_signals the server's listener stops it and exits first
    let signal = termination_signal().await.context("failed to install signal handler")?;
    info!(signal = %signal, "Received signal, stopping PostgreSQL server");

    server.stop().await?;
    Ok(signal.exit_code())
}
