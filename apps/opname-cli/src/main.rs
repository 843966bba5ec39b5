//! # Opname: Library Stock-Take Handheld
//!
//! Command-line front-end for the stock-take station.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Startup Sequence                                │
//! │                                                                         │
//! │  1. Initialize tracing (stderr, RUST_LOG or default filter)            │
//! │  2. Parse arguments (clap)                                              │
//! │  3. Load StationConfig: defaults ─► station.toml ─► OPNAME_* ─► --db    │
//! │  4. Dispatch the subcommand                                             │
//! │  5. On error: print "error: [Code] message", exit with its status      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cli;
mod commands;
mod console;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use opname_scan::StationConfig;

use crate::cli::Cli;
use crate::error::CliResult;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {}", err);
        std::process::exit(err.code.exit_code());
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = StationConfig::load(cli.config.clone())?;
    if let Some(db) = &cli.db {
        config.storage.database_path = db.clone();
    }

    commands::dispatch(cli, config).await
}

/// Initializes the tracing subscriber.
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,opname=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
