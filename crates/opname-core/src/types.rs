//! # Domain Types
//!
//! Core domain types used throughout the stock-take tool.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌─────────────────┐   │
//! │  │   CatalogEntry      │   │ SessionReport   │   │ ReportItem      │   │
//! │  │  ─────────────────  │   │  ─────────────  │   │  ─────────────  │   │
//! │  │  item_code (PK)     │   │  id (UUID)      │   │  report_id (FK) │   │
//! │  │  rfid_tag_hex (uniq)│   │  counts         │   │  final status   │   │
//! │  │  pairing_status     │   │  started/ended  │   │  sighting data  │   │
//! │  │  opname_status      │   └─────────────────┘   └─────────────────┘   │
//! │  └─────────────────────┘                                               │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ PairingStatus   │   │  OpnameStatus   │   │   ScanMethod    │       │
//! │  │  NotPaired      │   │  NotScanned     │   │   Uhf           │       │
//! │  │  ...Pending     │   │  Found          │   │   Barcode       │       │
//! │  │  WriteSuccess   │   │  Missing        │   └─────────────────┘       │
//! │  │  ...Failed      │   │  NewItem        │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Field Ownership
//! - Pairing fields (`rfid_tag_hex`, `tid`, `pairing_*`) are written only by
//!   the tag-pairing workflow.
//! - Opname fields (`opname_status`, `last_seen_timestamp`,
//!   `actual_scanned_location`, `last_scan_method`) are written only by the
//!   reconciliation engine during an active session.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Scan Method
// =============================================================================

/// The scanning modality that produced an identifier.
///
/// The two modalities are mutually exclusive on the handheld: the reader
/// can run either the UHF radio or the barcode imager, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    /// UHF RFID read; the identifier is an EPC.
    Uhf,
    /// Barcode read; the identifier is an item code.
    Barcode,
}

impl ScanMethod {
    /// Returns the other modality.
    pub fn other(self) -> Self {
        match self {
            ScanMethod::Uhf => ScanMethod::Barcode,
            ScanMethod::Barcode => ScanMethod::Uhf,
        }
    }

    /// Builds a method from the `uhf: bool` selector used by mode toggles.
    pub fn from_uhf_flag(uhf: bool) -> Self {
        if uhf {
            ScanMethod::Uhf
        } else {
            ScanMethod::Barcode
        }
    }
}

impl fmt::Display for ScanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMethod::Uhf => write!(f, "UHF"),
            ScanMethod::Barcode => write!(f, "Barcode"),
        }
    }
}

impl FromStr for ScanMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uhf" | "rfid" => Ok(ScanMethod::Uhf),
            "barcode" | "qr" => Ok(ScanMethod::Barcode),
            _ => Err(ValidationError::NotAllowed {
                field: "scan_method".to_string(),
                allowed: vec!["uhf".to_string(), "barcode".to_string()],
            }),
        }
    }
}

// =============================================================================
// Pairing Status
// =============================================================================

/// Persisted pairing progress of a catalog entry.
///
/// ## Progression
/// ```text
/// NotPaired ──► PairingPending ──► WritePending ──► WriteSuccess
///     │               │                 │
///     └───────────────┴─────────────────┴──► WriteFailed | PairingFailed
///
/// WriteSuccess ──(explicit re-pair only)──► PairingPending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    #[default]
    NotPaired,
    PairingPending,
    WritePending,
    WriteSuccess,
    WriteFailed,
    PairingFailed,
}

impl PairingStatus {
    /// Returns true for the two terminal failure states.
    pub fn is_failed(self) -> bool {
        matches!(self, PairingStatus::WriteFailed | PairingStatus::PairingFailed)
    }

    /// Position along the forward sequence; failures share the top rank.
    fn rank(self) -> u8 {
        match self {
            PairingStatus::NotPaired => 0,
            PairingStatus::PairingPending => 1,
            PairingStatus::WritePending => 2,
            PairingStatus::WriteSuccess => 3,
            PairingStatus::WriteFailed | PairingStatus::PairingFailed => 3,
        }
    }

    /// Checks whether moving from `self` to `next` respects the sequence.
    ///
    /// A success can only be left through an explicit re-pair. Failed states
    /// may restart the sequence, since a retry is always an operator action.
    pub fn allows(self, next: PairingStatus, explicit_repair: bool) -> bool {
        if self == next {
            return true;
        }
        match self {
            PairingStatus::WriteSuccess => explicit_repair,
            PairingStatus::WriteFailed | PairingStatus::PairingFailed => true,
            _ => next.is_failed() || next.rank() > self.rank(),
        }
    }
}

// =============================================================================
// Opname Status
// =============================================================================

/// Reconciliation status of an item within a stock-take session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OpnameStatus {
    #[default]
    NotScanned,
    Found,
    Missing,
    NewItem,
}

impl OpnameStatus {
    /// Items still needing operator attention sort first in every view.
    pub fn is_unresolved(self) -> bool {
        matches!(self, OpnameStatus::NotScanned | OpnameStatus::Missing)
    }
}

impl FromStr for OpnameStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "not_scanned" | "pending" => Ok(OpnameStatus::NotScanned),
            "found" => Ok(OpnameStatus::Found),
            "missing" => Ok(OpnameStatus::Missing),
            "new" | "new_item" | "unexpected" => Ok(OpnameStatus::NewItem),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec![
                    "not_scanned".to_string(),
                    "found".to_string(),
                    "missing".to_string(),
                    "new".to_string(),
                ],
            }),
        }
    }
}

// =============================================================================
// Catalog Entry
// =============================================================================

/// One physical/bibliographic item of the library catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CatalogEntry {
    /// Business key, immutable and unique.
    pub item_code: String,

    /// Display title.
    pub title: String,

    /// Expected shelf/location.
    pub location_name: String,

    /// EPC paired to this item (uppercase hex), unique across entries.
    pub rfid_tag_hex: Option<String>,

    /// Chip-unique TID read back after pairing.
    pub tid: Option<String>,

    pub pairing_status: PairingStatus,

    /// When the last successful pairing was persisted.
    #[ts(as = "Option<String>")]
    pub pairing_timestamp: Option<DateTime<Utc>>,

    pub opname_status: OpnameStatus,

    #[ts(as = "Option<String>")]
    pub last_seen_timestamp: Option<DateTime<Utc>>,

    /// Where the operator actually saw the item.
    pub actual_scanned_location: Option<String>,

    pub last_scan_method: Option<ScanMethod>,

    pub is_new_or_unexpected: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Creates an untagged, not-yet-scanned entry.
    pub fn new(
        item_code: impl Into<String>,
        title: impl Into<String>,
        location_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        CatalogEntry {
            item_code: item_code.into(),
            title: title.into(),
            location_name: location_name.into(),
            rfid_tag_hex: None,
            tid: None,
            pairing_status: PairingStatus::NotPaired,
            pairing_timestamp: None,
            opname_status: OpnameStatus::NotScanned,
            last_seen_timestamp: None,
            actual_scanned_location: None,
            last_scan_method: None,
            is_new_or_unexpected: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style helper to attach an already paired tag.
    pub fn with_tag(mut self, epc: impl Into<String>) -> Self {
        self.rfid_tag_hex = Some(epc.into());
        self.pairing_status = PairingStatus::WriteSuccess;
        self
    }

    /// Returns true if a tag EPC is recorded for this entry.
    pub fn is_tagged(&self) -> bool {
        self.rfid_tag_hex
            .as_deref()
            .map(|epc| !epc.trim().is_empty())
            .unwrap_or(false)
    }

    /// Session key: the EPC when present, else the item code.
    pub fn session_key(&self) -> String {
        match self.rfid_tag_hex.as_deref().map(str::trim) {
            Some(epc) if !epc.is_empty() => epc.to_uppercase(),
            _ => self.item_code.clone(),
        }
    }
}

// =============================================================================
// Pairing Record
// =============================================================================

/// The fields a pairing run hands to storage, keyed by `item_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRecord {
    pub item_code: String,
    pub rfid_tag_hex: Option<String>,
    pub tid: Option<String>,
    pub status: PairingStatus,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Sighting
// =============================================================================

/// The opname fields written to a catalog entry when it is first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    pub item_code: String,
    pub status: OpnameStatus,
    pub seen_at: DateTime<Utc>,
    pub method: ScanMethod,
    pub location: Option<String>,
}

// =============================================================================
// Session Report
// =============================================================================

/// A finalized stock-take session, persisted as one atomic write.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SessionReport {
    /// Report identifier (UUID v4).
    pub id: String,
    /// Operator-supplied report name.
    pub name: String,
    /// Identifier of the in-memory session the report was built from.
    pub session_id: String,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub finished_at: DateTime<Utc>,
    pub expected_count: i64,
    pub found_count: i64,
    pub missing_count: i64,
    pub new_count: i64,
    /// Per-item detail rows (loaded separately from storage).
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<SessionReportItem>,
}

/// One detail row of a [`SessionReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SessionReportItem {
    /// Catalog item code; `None` for a UHF sighting of an unknown tag.
    pub item_code: Option<String>,
    pub title: String,
    pub expected_location: Option<String>,
    pub rfid_tag_hex: Option<String>,
    pub status: OpnameStatus,
    #[ts(as = "Option<String>")]
    pub last_seen_timestamp: Option<DateTime<Utc>>,
    pub scan_method: Option<ScanMethod>,
    pub actual_scanned_location: Option<String>,
    pub is_new_or_unexpected: bool,
    /// Seen somewhere other than its expected location.
    pub misplaced: bool,
}
