//! # Hardware Facade
//!
//! The contract the coordinator needs from a reader driver. Every method is
//! fire-and-forget: `Ok(())` only means the command was accepted, the result
//! arrives later as a [`ScanEvent`](crate::event::ScanEvent).
//!
//! ## Command / Event Pairs
//! ```text
//! ┌───────────────────────────┬──────────────────────────────────────────┐
//! │ Command                   │ Answered by                              │
//! ├───────────────────────────┼──────────────────────────────────────────┤
//! │ start_inventory           │ InventoryTag*, InventoryFinished         │
//! │ read_single_tag_nearby    │ TagRead | ReadFailed                     │
//! │ start_barcode_scan        │ BarcodeRead | ReadFailed                 │
//! │ stop_operation            │ OperationStopped (optional)              │
//! │ stop_barcode_scan         │ OperationStopped (optional)              │
//! │ write_tag                 │ WriteResult                              │
//! │ lock_tag                  │ LockResult                               │
//! │ any                       │ DeviceError                              │
//! └───────────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Stopping an already stopped reader must be a harmless no-op.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use opname_core::pairing::WriteTagRequest;
use opname_core::ValidationError;

use crate::error::{ScanError, ScanResult};

// =============================================================================
// Lock Parameters
// =============================================================================

/// Tag memory bank addressed by a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBank {
    /// Kill and access passwords.
    Reserved,
    Epc,
    Tid,
    User,
}

impl fmt::Display for MemoryBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryBank::Reserved => write!(f, "reserved"),
            MemoryBank::Epc => write!(f, "epc"),
            MemoryBank::Tid => write!(f, "tid"),
            MemoryBank::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for MemoryBank {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reserved" | "password" => Ok(MemoryBank::Reserved),
            "epc" => Ok(MemoryBank::Epc),
            "tid" => Ok(MemoryBank::Tid),
            "user" => Ok(MemoryBank::User),
            _ => Err(ValidationError::NotAllowed {
                field: "bank".to_string(),
                allowed: vec!["reserved".into(), "epc".into(), "tid".into(), "user".into()],
            }
            .into()),
        }
    }
}

/// What a lock does to the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    Unlock,
    Lock,
    /// Irreversible.
    PermanentLock,
}

impl fmt::Display for LockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockAction::Unlock => write!(f, "unlock"),
            LockAction::Lock => write!(f, "lock"),
            LockAction::PermanentLock => write!(f, "permanent_lock"),
        }
    }
}

impl std::str::FromStr for LockAction {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unlock" => Ok(LockAction::Unlock),
            "lock" => Ok(LockAction::Lock),
            "permanent_lock" | "permalock" => Ok(LockAction::PermanentLock),
            _ => Err(ValidationError::NotAllowed {
                field: "action".to_string(),
                allowed: vec!["unlock".into(), "lock".into(), "permanent_lock".into()],
            }
            .into()),
        }
    }
}

/// Payload of a `lock_tag` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTagRequest {
    pub target_epc: String,
    pub access_password: String,
    pub bank: MemoryBank,
    pub action: LockAction,
}

// =============================================================================
// Facade Trait
// =============================================================================

/// Non-blocking reader driver.
///
/// Implementations must not block; an `Err` means the command was refused
/// outright (reader disconnected, SDK not initialised) and no event follows.
pub trait HardwareFacade: Send + Sync {
    fn start_inventory(&self) -> ScanResult<()>;

    fn stop_operation(&self) -> ScanResult<()>;

    fn read_single_tag_nearby(&self) -> ScanResult<()>;

    fn start_barcode_scan(&self) -> ScanResult<()>;

    fn stop_barcode_scan(&self) -> ScanResult<()>;

    fn write_tag(&self, request: &WriteTagRequest) -> ScanResult<()>;

    fn lock_tag(&self, request: &LockTagRequest) -> ScanResult<()>;
}

// =============================================================================
// Recording Reader
// =============================================================================

/// A command as the reader received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCommand {
    StartInventory,
    StopOperation,
    ReadSingleTag,
    StartBarcodeScan,
    StopBarcodeScan,
    WriteTag(WriteTagRequest),
    LockTag(LockTagRequest),
}

#[derive(Debug, Default)]
struct RecorderState {
    commands: Vec<HardwareCommand>,
    refuse_with: Option<String>,
}

/// The simulated handheld reader: accepts and records every command and
/// never answers on its own.
///
/// The console drives the station with it when no vendor reader is wired
/// in, and the tests use it the same way. Whatever the real device would
/// report (tag reads, write results, stop acknowledgments) is injected
/// through [`DeviceCallbacks`](crate::event::DeviceCallbacks).
#[derive(Debug, Clone, Default)]
pub struct SimulatedReader {
    state: Arc<Mutex<RecorderState>>,
}

impl SimulatedReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RecorderState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn record(&self, command: HardwareCommand) -> ScanResult<()> {
        self.with_state(|state| {
            if let Some(reason) = state.refuse_with.clone() {
                return Err(ScanError::Device(reason));
            }
            state.commands.push(command);
            Ok(())
        })
    }

    /// Every accepted command, oldest first.
    pub fn commands(&self) -> Vec<HardwareCommand> {
        self.with_state(|state| state.commands.clone())
    }

    /// Removes and returns the accepted commands.
    pub fn take_commands(&self) -> Vec<HardwareCommand> {
        self.with_state(|state| std::mem::take(&mut state.commands))
    }

    /// Refuses every following command with `reason` (`None` to accept again).
    pub fn refuse_commands(&self, reason: Option<&str>) {
        self.with_state(|state| state.refuse_with = reason.map(str::to_string));
    }
}

impl HardwareFacade for SimulatedReader {
    fn start_inventory(&self) -> ScanResult<()> {
        self.record(HardwareCommand::StartInventory)
    }

    fn stop_operation(&self) -> ScanResult<()> {
        self.record(HardwareCommand::StopOperation)
    }

    fn read_single_tag_nearby(&self) -> ScanResult<()> {
        self.record(HardwareCommand::ReadSingleTag)
    }

    fn start_barcode_scan(&self) -> ScanResult<()> {
        self.record(HardwareCommand::StartBarcodeScan)
    }

    fn stop_barcode_scan(&self) -> ScanResult<()> {
        self.record(HardwareCommand::StopBarcodeScan)
    }

    fn write_tag(&self, request: &WriteTagRequest) -> ScanResult<()> {
        self.record(HardwareCommand::WriteTag(request.clone()))
    }

    fn lock_tag(&self, request: &LockTagRequest) -> ScanResult<()> {
        self.record(HardwareCommand::LockTag(request.clone()))
    }
}
