//! # Catalog Commands
//!
//! ```text
//! opname catalog list [--search Q]   ─► load_catalog / search
//! opname catalog add CODE TITLE LOC  ─► validate ─► insert
//! ```

use std::time::Instant;

use tracing::info;

use opname_core::validation::{
    normalize_epc, normalize_item_code, validate_epc_hex, validate_item_code,
    validate_search_query, validate_title,
};
use opname_core::CatalogEntry;
use opname_scan::StationConfig;

use crate::cli::CatalogCommand;
use crate::error::CliResult;

use super::open_database;

pub async fn run(command: CatalogCommand, config: &StationConfig, json: bool) -> CliResult<()> {
    match command {
        CatalogCommand::List { search, limit } => list(search, limit, config, json).await,
        CatalogCommand::Add {
            item_code,
            title,
            location,
            epc,
        } => add(item_code, title, location, epc, config, json).await,
    }
}

async fn list(
    search: Option<String>,
    limit: u32,
    config: &StationConfig,
    json: bool,
) -> CliResult<()> {
    let start = Instant::now();
    let db = open_database(config).await?;
    let catalog = db.catalog();

    let entries = match search {
        Some(query) => {
            let query = validate_search_query(&query)?;
            catalog.search(&query, limit).await?
        }
        None => {
            let mut entries = catalog.load_catalog().await?;
            entries.truncate(limit as usize);
            entries
        }
    };
    let total = catalog.count().await?;

    info!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        count = entries.len(),
        "catalog list complete"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{:<14} {:<14} {:<40} {:<24} {}",
            entry.item_code,
            format!("{:?}", entry.pairing_status),
            entry.title,
            entry.location_name,
            entry.rfid_tag_hex.as_deref().unwrap_or("-"),
        );
    }
    println!("{} of {} entries", entries.len(), total);
    Ok(())
}

async fn add(
    item_code: String,
    title: String,
    location: String,
    epc: Option<String>,
    config: &StationConfig,
    json: bool,
) -> CliResult<()> {
    validate_item_code(&item_code)?;
    validate_title(&title)?;

    let mut entry = CatalogEntry::new(
        normalize_item_code(&item_code),
        title.trim(),
        location.trim(),
    );
    if let Some(epc) = epc {
        validate_epc_hex(&epc)?;
        entry = entry.with_tag(normalize_epc(&epc));
    }

    let db = open_database(config).await?;
    db.catalog().insert(&entry).await?;
    info!(item_code = %entry.item_code, "Catalog entry added");

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Added {} ({:?})", entry.item_code, entry.pairing_status);
    }
    Ok(())
}
