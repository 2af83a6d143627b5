//! MyWallet CLI - command line access to the MyWallet personal finance API.
//!
//! Handles sign-in and sign-out, and lists transactions, accounts,
//! categories and reports for the signed-in user.

mod commands;

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mywallet_core::{ApiError, Config};

use commands::Cli;

/// Exit code when the server rejected the session and it could not be renewed
const EXIT_SESSION_EXPIRED: i32 = 2;

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard when `MYWALLET_LOG_DIR` is set; keep it alive
/// until exit so buffered lines get flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os("MYWALLET_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mywallet.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let log_guard = init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    info!(provider = ?config.provider, storage = ?config.storage, "MyWallet starting");

    let api = mywallet_core::connect(&config)
        .await
        .context("Failed to set up API client")?;

    if let Err(e) = commands::run(cli.command, &api, &mut config).await {
        if let Some(ApiError::Unauthorized) = e.downcast_ref::<ApiError>() {
            eprintln!("Session expired, please log in again (mywallet login)");
            drop(log_guard);
            std::process::exit(EXIT_SESSION_EXPIRED);
        }
        return Err(e);
    }
    Ok(())
}
