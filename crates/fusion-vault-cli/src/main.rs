//! fusion-vault - command-line host for the credential vault.
//!
//! Drives the same storage layout the Fusion OS widget uses, backed by a
//! JSON file in the platform data directory.

mod commands;
mod password;

use std::path::PathBuf;

use anyhow::Result;
use fusion_vault_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Overrides the configured data directory
const DATA_DIR_ENV: &str = "FUSION_VAULT_DIR";

/// Initialize the tracing subscriber for logging.
///
/// Use the RUST_LOG env var to control the level (e.g., RUST_LOG=debug).
/// The returned guard flushes buffered lines when dropped.
fn init_tracing() -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let guard = init_tracing();

    let result = run().await;
    drop(guard);
    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = commands::parse_args(&args)?;

    let mut config = Config::load()?;
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        config.data_dir = Some(PathBuf::from(dir));
    }
    info!("fusion-vault starting");

    commands::run(command, &config).await
}
