//! # opname-core: Pure Domain Logic for the Stock-Take Handheld
//!
//! This crate is the **heart** of the stock-take tool. It contains the
//! catalog model, the reconciliation rules and the tag-pairing state machine
//! as plain synchronous code with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Stock-Take Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/opname-cli (or any UI)                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ StationHandle                          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          opname-scan (coordinator, station actor)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ opname-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────────┐  ┌──────┐  │   │
//! │  │   │   types   │  │  pairing  │  │ reconciliation │  │ epc  │  │   │
//! │  │   │ Catalog   │  │ Tagging   │  │ ScanSession    │  │      │  │   │
//! │  │   │ Report    │  │ State FSM │  │ Counts/Filter  │  │      │  │   │
//! │  │   └───────────┘  └───────────┘  └────────────────┘  └──────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO DEVICE • NO TIMERS                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 opname-db (Database Layer)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Catalog entries, statuses, session reports
//! - [`error`] - Domain error types
//! - [`validation`] - Item code / EPC / text validation
//! - [`epc`] - Target EPC derivation from an item code
//! - [`pairing`] - TaggingState transition table and pairing state machine
//! - [`reconciliation`] - Stock-take session, classification, filtering, counts
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use opname_core::reconciliation::ReconciliationEngine;
//! use opname_core::{CatalogEntry, ScanMethod};
//!
//! let catalog = vec![CatalogEntry::new("B001", "Dune", "Shelf A")];
//!
//! let mut engine = ReconciliationEngine::new();
//! engine.start_session(catalog, Utc::now());
//! engine.resolve_scan("B001", ScanMethod::Barcode, Utc::now()).unwrap();
//!
//! let counts = engine.counts().unwrap();
//! assert_eq!(counts.found, 1);
//! assert_eq!(counts.found + counts.missing, counts.expected);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod epc;
pub mod error;
pub mod pairing;
pub mod reconciliation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Width of a derived target EPC in hex digits (96-bit EPC).
pub const TARGET_EPC_HEX_LEN: usize = 24;

/// Upper bound, in seconds, for a single-shot UHF read before it is
/// reported as timed out.
pub const SINGLE_READ_TIMEOUT_SECS: u64 = 7;

/// Access password used when the station config does not provide one.
///
/// Factory-fresh UHF tags ship with an all-zero access password.
pub const DEFAULT_ACCESS_PASSWORD: &str = "00000000";

/// Maximum length of an item code.
pub const MAX_ITEM_CODE_LEN: usize = 64;
