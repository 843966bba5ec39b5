//! # Config Commands
//!
//! `config show` prints the effective configuration (file, then
//! `OPNAME_*` overrides, then `--db`). `config init` writes the defaults.

use std::path::PathBuf;

use tracing::info;

use opname_scan::StationConfig;

use crate::cli::ConfigCommand;
use crate::error::{CliError, CliResult, ErrorCode};

pub fn run(command: ConfigCommand, path: Option<PathBuf>, config: &StationConfig) -> CliResult<()> {
    match command {
        ConfigCommand::Show => {
            let text = toml::to_string_pretty(config)
                .map_err(|e| CliError::new(ErrorCode::ConfigError, e.to_string()))?;
            print!("{}", text);
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let target = path
                .or_else(StationConfig::default_config_path)
                .ok_or_else(|| CliError::new(ErrorCode::ConfigError, "No config path available"))?;
            if target.exists() && !force {
                return Err(CliError::new(
                    ErrorCode::ConfigError,
                    format!(
                        "{} already exists (use --force to overwrite)",
                        target.display()
                    ),
                ));
            }

            let written = StationConfig::default().save(Some(target))?;
            info!(path = %written.display(), "Station config written");
            println!("Wrote {}", written.display());
            Ok(())
        }
    }
}
