//! # Station Commands
//!
//! Start a [`ScanStation`] over the configured database and hand it to the
//! console.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database ──► Arc<dyn CatalogStore> ──┐                                 │
//! │                                       ├──► ScanStation::start(events)   │
//! │  SimulatedReader ─► Arc<dyn Hardware> ┘            │                    │
//! │                                                    ▼                    │
//! │  DeviceCallbacks ◄──── Console ────────────► StationHandle              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use opname_scan::{
    DeviceCallbacks, ScanPurpose, ScanStation, SimulatedReader, StationConfig, StationHandle,
};

use crate::cli::{PairArgs, StocktakeArgs};
use crate::console::Console;
use crate::error::CliResult;

use super::open_database;

struct RunningStation {
    handle: StationHandle,
    callbacks: DeviceCallbacks,
    reader: SimulatedReader,
}

async fn start_station(config: &StationConfig) -> CliResult<RunningStation> {
    let db = open_database(config).await?;
    // No vendor reader is bundled; console commands stand in for the device.
    let reader = SimulatedReader::new();
    let (callbacks, events) = DeviceCallbacks::channel();

    let handle = ScanStation::new(config, Arc::new(reader.clone()), Arc::new(db)).start(events);
    info!(device_id = %config.device_id(), reader = "simulated", "Station started");

    Ok(RunningStation {
        handle,
        callbacks,
        reader,
    })
}

/// `opname stocktake`: opens (or resumes) a session and runs the console.
pub async fn stocktake(args: StocktakeArgs, config: &StationConfig, json: bool) -> CliResult<()> {
    let station = start_station(config).await?;
    let location = args.location.or_else(|| config.session.location.clone());

    let session = if args.resume {
        station.handle.resume_session(location).await?
    } else {
        station.handle.start_session(location).await?
    };
    println!(
        "Session {} started: {} item(s) expected, {} already found",
        session.session_id, session.counts.expected, session.counts.found
    );

    Console::new(
        station.handle,
        station.callbacks,
        station.reader,
        ScanPurpose::StockTake,
        json,
    )
    .run()
    .await
}

/// `opname pair`: runs the tag pairing console, optionally looking an item
/// up first.
pub async fn pair(args: PairArgs, config: &StationConfig, json: bool) -> CliResult<()> {
    let station = start_station(config).await?;

    if let Some(item_code) = args.item_code {
        // A failed lookup shows up as the console's first status line
        if let Err(e) = station.handle.search_item(item_code).await {
            debug!(error = %e, "Initial lookup failed");
        }
    }

    Console::new(
        station.handle,
        station.callbacks,
        station.reader,
        ScanPurpose::PairingSearch,
        json,
    )
    .run()
    .await
}
