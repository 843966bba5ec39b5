//! # Command-Line Interface
//!
//! ```text
//! opname [--config PATH] [--db PATH] <COMMAND>
//!
//!   catalog list [--search Q] [--limit N]     browse the catalog
//!   catalog add <CODE> <TITLE> <LOCATION>      add one entry
//!   stocktake [--resume] [--location L]        interactive stock-take
//!   pair [ITEM_CODE]                           interactive tag pairing
//!   reports [ID] [--limit N]                   saved stock-take reports
//!   config show | init [--force]               station configuration
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "opname", version, about = "Library stock-take handheld")]
pub struct Cli {
    /// Station config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "OPNAME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Browse and maintain the catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Run an interactive stock-take session
    Stocktake(StocktakeArgs),

    /// Pair catalog entries with RFID tags
    Pair(PairArgs),

    /// List saved stock-take reports, or show one
    Reports(ReportsArgs),

    /// Show or create the station config
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// List entries, optionally filtered
    List {
        /// Match title, item code, location or EPC
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },

    /// Add one entry
    Add {
        item_code: String,
        title: String,
        location: String,

        /// EPC of a tag already attached to the item
        #[arg(long)]
        epc: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct StocktakeArgs {
    /// Continue from the sightings already recorded
    #[arg(long)]
    pub resume: bool,

    /// Location being audited
    #[arg(short, long)]
    pub location: Option<String>,
}

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Look this item up before the console starts
    pub item_code: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReportsArgs {
    /// Report to show in detail
    pub id: Option<String>,

    #[arg(short, long, default_value_t = 20)]
    pub limit: u32,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stocktake() {
        let cli = Cli::parse_from(["opname", "stocktake", "--resume", "-l", "Reading Room"]);
        match cli.command {
            Command::Stocktake(args) => {
                assert!(args.resume);
                assert_eq!(args.location.as_deref(), Some("Reading Room"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_db_after_subcommand() {
        let cli = Cli::parse_from(["opname", "catalog", "list", "--db", "/tmp/x.db"]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(
            cli.command,
            Command::Catalog(CatalogCommand::List { limit: 50, .. })
        ));
    }
}
