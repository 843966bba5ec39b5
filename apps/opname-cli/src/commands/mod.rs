//! # Commands
//!
//! One module per top-level subcommand.
//!
//! ```text
//! commands/
//! ├── mod.rs      ◄─── dispatch + shared database opening
//! ├── catalog.rs  ◄─── catalog list / add
//! ├── report.rs   ◄─── saved stock-take reports
//! ├── config.rs   ◄─── station config show / init
//! └── station.rs  ◄─── interactive stock-take and pairing consoles
//! ```

pub mod catalog;
pub mod config;
pub mod report;
pub mod station;

use tracing::debug;

use opname_db::{Database, DbConfig};
use opname_scan::StationConfig;

use crate::cli::{Cli, Command};
use crate::error::CliResult;

/// Runs the parsed command against the loaded config.
pub async fn dispatch(cli: Cli, config: StationConfig) -> CliResult<()> {
    let json = cli.json;
    match cli.command {
        Command::Catalog(command) => catalog::run(command, &config, json).await,
        Command::Stocktake(args) => station::stocktake(args, &config, json).await,
        Command::Pair(args) => station::pair(args, &config, json).await,
        Command::Reports(args) => report::run(args, &config, json).await,
        Command::Config(command) => config::run(command, cli.config, &config),
    }
}

/// Opens the configured database, creating its directory on first use.
pub async fn open_database(config: &StationConfig) -> CliResult<Database> {
    let path = &config.storage.database_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), "Opening database");
    Ok(Database::new(DbConfig::new(path)).await?)
}
