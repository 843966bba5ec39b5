//! # opname-scan: Reader Coordination for the Stock-Take Handheld
//!
//! This crate sits between the reader hardware and the pure domain logic in
//! `opname-core`. It decides which modality owns the reader, turns reader
//! callbacks into workflow steps and persists the results.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Scan Station Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 ScanStation (actor, one per reader)              │  │
//! │  │                                                                  │  │
//! │  │  Spawned as a Tokio task, driven through a StationHandle        │  │
//! │  │  Publishes a StationSnapshot after every step                    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ ScanMode       │  │ StockTakeFlow  │  │ TagPairingWorkflow     │    │
//! │  │ Coordinator    │  │                │  │                        │    │
//! │  │ UHF xor barcode│  │ Reconciliation │  │ lookup → write EPC →   │    │
//! │  │ 7 s read bound │  │ + sightings    │  │ read TID → save        │    │
//! │  │ busy flag      │  │ + reports      │  │                        │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          │                   └───────────┬───────────┘                 │
//! │          ▼                               ▼                              │
//! │   HardwareFacade                   CatalogStore                         │
//! │   (commands out,                   (opname-db Database)                 │
//! │    ScanEvent channel in)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Station configuration (reader mode, timeout, storage)
//! - [`coordinator`] - `ScanModeCoordinator`, the single owner of the reader
//! - [`error`] - Scan error types
//! - [`event`] - Reader events and the callback-to-channel adapter
//! - [`hardware`] - `HardwareFacade` contract and a recording reader
//! - [`pairing`] - Tag pairing workflow driver
//! - [`station`] - The station actor and its handle
//! - [`stocktake`] - Stock-take flow over the reconciliation engine
//! - [`store`] - `CatalogStore` contract
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use opname_scan::{DeviceCallbacks, ScanPurpose, ScanStation, SimulatedReader, StationConfig};
//!
//! let config = StationConfig::load_or_default(None);
//! let (callbacks, events) = DeviceCallbacks::channel();
//! let reader = Arc::new(SimulatedReader::new());
//!
//! let handle = ScanStation::new(&config, reader, Arc::new(database)).start(events);
//! handle.start_session(None).await?;
//! handle.toggle_scan(ScanPurpose::StockTake).await?;
//!
//! // The reader driver reports results through the callbacks
//! callbacks.on_barcode_scanned("B001");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod hardware;
pub mod pairing;
pub mod station;
pub mod stocktake;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DeviceConfig, ReaderSettings, SessionSettings, StationConfig, StorageSettings};
pub use coordinator::{
    CoordinatorSnapshot, DeviceOperation, DeviceOutcome, ResolvedScan, ScanActivity,
    ScanModeCoordinator, ScanOperation, ScanOutcome, ScanPurpose, ToggleOutcome,
};
pub use error::{ScanError, ScanResult};
pub use event::{DeviceCallbacks, ScanEvent};
pub use hardware::{
    HardwareCommand, HardwareFacade, LockAction, LockTagRequest, MemoryBank, SimulatedReader,
};
pub use pairing::TagPairingWorkflow;
pub use station::{ScanStation, StationHandle, StationSnapshot};
pub use stocktake::StockTakeFlow;
pub use store::CatalogStore;
