//! # Scan Mode Coordinator
//!
//! The single authority over the reader. Callers never talk to the
//! [`HardwareFacade`] directly; they ask the coordinator, which guarantees
//! that at most one modality is active and that no scan starts while a
//! write, TID read or lock is outstanding.
//!
//! ## State
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   activity: Idle | Active { method, operation, purpose, deadline }      │
//! │   pending:  None | Some(WriteEpc | ReadTid | Lock)     ("busy" flag)    │
//! │                                                                         │
//! │   Idle ──toggle──► Active(UHF single read, 7 s deadline)                │
//! │                    Active(UHF inventory, no deadline)                   │
//! │                    Active(Barcode)                                      │
//! │                                                                         │
//! │   Active ──TagRead/BarcodeRead──► Resolved  ─┐                          │
//! │          ──ReadFailed/DeviceError► Failed    │                          │
//! │          ──deadline passed───────► TimedOut  ├──► Idle                  │
//! │          ──toggle / select / clear► Stopped ─┘                          │
//! │                                                                         │
//! │   Inventory stays Active across InventoryTag hits.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One `activity` value instead of two booleans: "UHF and barcode both
//! active" cannot be represented.
//!
//! Stops are applied to the local state immediately. The reader's
//! `OperationStopped` acknowledgment may arrive later, possibly after a scan
//! of the other modality has started. The last unacknowledged stop is
//! remembered with its modality and swallowed only while a scan of a
//! different modality is active. It is forgotten once the reader answers
//! anything else for the active scan, or a scan of the same modality starts.
//!
//! Timers live outside: the coordinator stores deadlines and the owner
//! calls [`ScanModeCoordinator::check_timeout`] when the earliest one passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use ts_rs::TS;

use opname_core::pairing::WriteTagRequest;
use opname_core::{ScanMethod, SINGLE_READ_TIMEOUT_SECS};

use crate::error::{ScanError, ScanResult};
use crate::event::ScanEvent;
use crate::hardware::{HardwareFacade, LockTagRequest};

// =============================================================================
// Activity Types
// =============================================================================

/// Which workflow a scan was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ScanPurpose {
    /// Identifiers go to the reconciliation engine.
    #[default]
    StockTake,
    /// Identifiers become a pairing lookup.
    PairingSearch,
}

/// The reader operation behind an active scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ScanOperation {
    SingleRead,
    Inventory,
    Barcode,
}

/// A non-scan reader operation. While one is outstanding the reader is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOperation {
    WriteEpc,
    ReadTid,
    Lock,
}

impl fmt::Display for DeviceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceOperation::WriteEpc => write!(f, "writing EPC"),
            DeviceOperation::ReadTid => write!(f, "reading TID"),
            DeviceOperation::Lock => write!(f, "locking tag"),
        }
    }
}

/// What the reader is doing for a scan right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanActivity {
    #[default]
    Idle,
    Active {
        method: ScanMethod,
        operation: ScanOperation,
        purpose: ScanPurpose,
        deadline: Option<Instant>,
    },
}

impl ScanActivity {
    pub fn active_method(&self) -> Option<ScanMethod> {
        match self {
            ScanActivity::Idle => None,
            ScanActivity::Active { method, .. } => Some(*method),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingDevice {
    operation: DeviceOperation,
    deadline: Option<Instant>,
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of [`ScanModeCoordinator::toggle_scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started(ScanOperation),
    /// User-initiated stop.
    Stopped,
}

/// An identifier produced by a scan, with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScan {
    pub identifier: String,
    pub method: ScanMethod,
    pub purpose: ScanPurpose,
    pub tid: Option<String>,
}

/// Result of a write, TID read or lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    WriteCompleted {
        success: bool,
        epc: Option<String>,
        error: Option<String>,
    },
    TidRead {
        epc: String,
        tid: Option<String>,
    },
    LockCompleted {
        success: bool,
        error: Option<String>,
    },
    Failed {
        operation: DeviceOperation,
        reason: String,
    },
}

/// What a reader event (or a passed deadline) meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Resolved(ResolvedScan),
    ScanFailed {
        method: ScanMethod,
        purpose: ScanPurpose,
        reason: String,
    },
    TimedOut {
        method: ScanMethod,
        purpose: ScanPurpose,
        after_secs: u64,
    },
    /// The reader ended the scan on its own.
    Stopped { method: ScanMethod },
    Device(DeviceOutcome),
    /// Device error while nothing was in flight.
    Fault { message: String },
    /// Stale, unsolicited or acknowledgment event.
    Ignored,
}

/// Immutable view for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CoordinatorSnapshot {
    pub selected_mode: ScanMethod,
    pub active_mode: Option<ScanMethod>,
    pub operation: Option<ScanOperation>,
    pub purpose: Option<ScanPurpose>,
    pub device_operation: Option<DeviceOperation>,
    pub uhf_active: bool,
    pub barcode_active: bool,
    pub continuous_inventory: bool,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Arbitrates the reader between the two modalities and the device
/// operations of the pairing workflow.
pub struct ScanModeCoordinator {
    facade: Arc<dyn HardwareFacade>,
    selected: ScanMethod,
    activity: ScanActivity,
    pending: Option<PendingDevice>,
    read_timeout: Duration,
    continuous_inventory: bool,
    /// Modality of the last stop the reader has not acknowledged.
    unacked_stop: Option<ScanMethod>,
}

impl fmt::Debug for ScanModeCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanModeCoordinator")
            .field("selected", &self.selected)
            .field("activity", &self.activity)
            .field("pending", &self.pending)
            .field("unacked_stop", &self.unacked_stop)
            .finish()
    }
}

impl ScanModeCoordinator {
    pub fn new(facade: Arc<dyn HardwareFacade>, default_mode: ScanMethod) -> Self {
        ScanModeCoordinator {
            facade,
            selected: default_mode,
            activity: ScanActivity::Idle,
            pending: None,
            read_timeout: Duration::from_secs(SINGLE_READ_TIMEOUT_SECS),
            continuous_inventory: false,
            unacked_stop: None,
        }
    }

    /// Sets the bound of single-shot reads (UHF scan and TID read).
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// UHF toggles start a continuous inventory instead of a single read.
    pub fn with_continuous_inventory(mut self, continuous: bool) -> Self {
        self.continuous_inventory = continuous;
        self
    }

    pub fn selected_mode(&self) -> ScanMethod {
        self.selected
    }

    pub fn activity(&self) -> ScanActivity {
        self.activity
    }

    pub fn pending_operation(&self) -> Option<DeviceOperation> {
        self.pending.map(|p| p.operation)
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    // =========================================================================
    // Modality Control
    // =========================================================================

    /// Records the preferred modality.
    ///
    /// A scan of the other modality is stopped first. No-op if the mode is
    /// already selected.
    pub fn select_mode(&mut self, uhf: bool) {
        let requested = ScanMethod::from_uhf_flag(uhf);
        if requested == self.selected {
            return;
        }

        if let Some(active) = self.activity.active_method() {
            if active != requested {
                info!(stopping = %active, selecting = %requested, "Switching scan mode");
                self.stop_active();
            }
        }

        self.selected = requested;
        debug!(mode = %requested, "Scan mode selected");
    }

    /// Starts the selected modality, or stops it if it is running.
    ///
    /// ## Errors
    /// - `Busy` while a write/TID read/lock is outstanding
    /// - `ModeConflict` if the other modality is active
    /// - `Device` if the reader refuses the start command (state stays Idle)
    pub fn toggle_scan(&mut self, purpose: ScanPurpose, now: Instant) -> ScanResult<ToggleOutcome> {
        if let Some(pending) = self.pending {
            return Err(ScanError::Busy(pending.operation));
        }

        match self.activity {
            ScanActivity::Active { method, .. } if method == self.selected => {
                self.stop_active();
                info!(mode = %method, "Scan stopped by user");
                Ok(ToggleOutcome::Stopped)
            }
            ScanActivity::Active { method, .. } => Err(ScanError::ModeConflict {
                active: method,
                requested: self.selected,
            }),
            ScanActivity::Idle => self.start_scan(purpose, now),
        }
    }

    fn start_scan(&mut self, purpose: ScanPurpose, now: Instant) -> ScanResult<ToggleOutcome> {
        let method = self.selected;
        // A stop of this modality is settled once it is restarted
        if self.unacked_stop == Some(method) {
            self.unacked_stop = None;
        }
        let (operation, deadline) = match method {
            ScanMethod::Uhf if self.continuous_inventory => {
                self.facade.start_inventory()?;
                (ScanOperation::Inventory, None)
            }
            ScanMethod::Uhf => {
                self.facade.read_single_tag_nearby()?;
                (ScanOperation::SingleRead, Some(now + self.read_timeout))
            }
            ScanMethod::Barcode => {
                self.facade.start_barcode_scan()?;
                (ScanOperation::Barcode, None)
            }
        };

        self.activity = ScanActivity::Active {
            method,
            operation,
            purpose,
            deadline,
        };
        info!(mode = %method, ?operation, ?purpose, "Scan started");
        Ok(ToggleOutcome::Started(operation))
    }

    /// Stops whatever is running and returns to Idle. Idempotent.
    ///
    /// Returns the device operation that was cut off, so its owner can end
    /// it as failed.
    pub fn clear(&mut self) -> Option<DeviceOperation> {
        if self.activity != ScanActivity::Idle {
            self.stop_active();
        }
        self.cancel_device_operation()
    }

    fn stop_active(&mut self) {
        if let Some(method) = self.activity.active_method() {
            self.issue_stop(method);
        }
        self.activity = ScanActivity::Idle;
    }

    /// Sends the stop command for a modality. A refused stop is logged only:
    /// the local state is reset either way.
    fn issue_stop(&mut self, method: ScanMethod) {
        let result = match method {
            ScanMethod::Uhf => self.facade.stop_operation(),
            ScanMethod::Barcode => self.facade.stop_barcode_scan(),
        };
        match result {
            Ok(()) => self.unacked_stop = Some(method),
            Err(e) => warn!(mode = %method, error = %e, "Reader refused stop"),
        }
    }

    // =========================================================================
    // Device Operations
    // =========================================================================

    /// Fails unless the reader is idle: no scan active, nothing outstanding.
    pub fn ensure_ready(&self) -> ScanResult<()> {
        if let Some(pending) = self.pending {
            return Err(ScanError::Busy(pending.operation));
        }
        if let Some(active) = self.activity.active_method() {
            return Err(ScanError::ModeConflict {
                active,
                requested: ScanMethod::Uhf,
            });
        }
        Ok(())
    }

    fn begin_device_operation(
        &mut self,
        operation: DeviceOperation,
        deadline: Option<Instant>,
        command: impl FnOnce(&dyn HardwareFacade) -> ScanResult<()>,
    ) -> ScanResult<()> {
        self.ensure_ready()?;
        command(self.facade.as_ref())?;
        self.pending = Some(PendingDevice {
            operation,
            deadline,
        });
        debug!(%operation, "Device operation started");
        Ok(())
    }

    /// Issues an EPC write. The reader is busy until `WriteResult` arrives.
    pub fn write_tag(&mut self, request: &WriteTagRequest) -> ScanResult<()> {
        self.begin_device_operation(DeviceOperation::WriteEpc, None, |facade| {
            facade.write_tag(request)
        })
    }

    /// Issues the single-tag read that returns the TID, bounded like a
    /// single-shot scan.
    pub fn read_tid(&mut self, now: Instant) -> ScanResult<()> {
        let deadline = now + self.read_timeout;
        self.begin_device_operation(DeviceOperation::ReadTid, Some(deadline), |facade| {
            facade.read_single_tag_nearby()
        })
    }

    pub fn lock_tag(&mut self, request: &LockTagRequest) -> ScanResult<()> {
        self.begin_device_operation(DeviceOperation::Lock, None, |facade| {
            facade.lock_tag(request)
        })
    }

    /// Abandons the outstanding device operation, if any.
    pub fn cancel_device_operation(&mut self) -> Option<DeviceOperation> {
        let pending = self.pending.take()?;
        info!(operation = %pending.operation, "Device operation cancelled");
        self.issue_stop(ScanMethod::Uhf);
        Some(pending.operation)
    }

    // =========================================================================
    // Event Routing
    // =========================================================================

    /// Routes one reader event to the owner of the current operation.
    pub fn on_scan_event(&mut self, event: ScanEvent) -> ScanOutcome {
        if event == ScanEvent::OperationStopped {
            let stale = self.unacked_stop.take();
            if let (Some(stopped), Some(active)) = (stale, self.activity.active_method()) {
                if stopped != active && self.pending.is_none() {
                    debug!(mode = %stopped, "Stop acknowledged by reader");
                    return ScanOutcome::Ignored;
                }
            }
        } else if self.pending.is_none() && self.activity != ScanActivity::Idle {
            // The reader has moved on to the active scan
            self.unacked_stop = None;
        }

        if let Some(pending) = self.pending {
            return self.route_device_event(pending.operation, event);
        }

        match self.activity {
            ScanActivity::Active {
                method,
                operation,
                purpose,
                ..
            } => self.route_scan_event(method, operation, purpose, event),
            ScanActivity::Idle => match event {
                ScanEvent::DeviceError { message } => {
                    warn!(%message, "Reader fault while idle");
                    ScanOutcome::Fault { message }
                }
                other => {
                    debug!(kind = other.kind(), "Reader event with no active operation");
                    ScanOutcome::Ignored
                }
            },
        }
    }

    fn route_device_event(&mut self, operation: DeviceOperation, event: ScanEvent) -> ScanOutcome {
        let outcome = match (operation, event) {
            (DeviceOperation::WriteEpc, ScanEvent::WriteResult { success, epc, error }) => {
                DeviceOutcome::WriteCompleted {
                    success,
                    epc,
                    error,
                }
            }
            (DeviceOperation::ReadTid, ScanEvent::TagRead { epc, tid }) => {
                DeviceOutcome::TidRead { epc, tid }
            }
            (DeviceOperation::ReadTid, ScanEvent::ReadFailed { reason }) => {
                DeviceOutcome::Failed { operation, reason }
            }
            (DeviceOperation::Lock, ScanEvent::LockResult { success, error }) => {
                DeviceOutcome::LockCompleted { success, error }
            }
            (operation, ScanEvent::DeviceError { message }) => {
                warn!(%operation, %message, "Reader fault during device operation");
                DeviceOutcome::Failed {
                    operation,
                    reason: message,
                }
            }
            (operation, other) => {
                debug!(%operation, kind = other.kind(), "Event does not answer the device operation");
                return ScanOutcome::Ignored;
            }
        };

        self.pending = None;
        ScanOutcome::Device(outcome)
    }

    fn route_scan_event(
        &mut self,
        method: ScanMethod,
        operation: ScanOperation,
        purpose: ScanPurpose,
        event: ScanEvent,
    ) -> ScanOutcome {
        let resolved = |identifier: String, tid: Option<String>| {
            ScanOutcome::Resolved(ResolvedScan {
                identifier,
                method,
                purpose,
                tid,
            })
        };

        match (operation, event) {
            (ScanOperation::SingleRead, ScanEvent::TagRead { epc, tid }) => {
                self.activity = ScanActivity::Idle;
                resolved(epc, tid)
            }
            (ScanOperation::Barcode, ScanEvent::BarcodeRead { code }) => {
                self.activity = ScanActivity::Idle;
                resolved(code, None)
            }
            (ScanOperation::Inventory, ScanEvent::InventoryTag { epc })
            | (ScanOperation::Inventory, ScanEvent::TagRead { epc, .. }) => resolved(epc, None),
            (ScanOperation::Inventory, ScanEvent::InventoryFinished)
            | (_, ScanEvent::OperationStopped) => {
                self.activity = ScanActivity::Idle;
                info!(mode = %method, "Scan ended by reader");
                ScanOutcome::Stopped { method }
            }
            (_, ScanEvent::ReadFailed { reason }) | (_, ScanEvent::DeviceError { message: reason }) => {
                self.activity = ScanActivity::Idle;
                warn!(mode = %method, %reason, "Scan failed");
                ScanOutcome::ScanFailed {
                    method,
                    purpose,
                    reason,
                }
            }
            (_, other) => {
                debug!(mode = %method, kind = other.kind(), "Event does not belong to the active scan");
                ScanOutcome::Ignored
            }
        }
    }

    // =========================================================================
    // Timeouts
    // =========================================================================

    /// The earliest deadline the owner must wake up for.
    pub fn next_deadline(&self) -> Option<Instant> {
        let scan = match self.activity {
            ScanActivity::Active { deadline, .. } => deadline,
            ScanActivity::Idle => None,
        };
        let device = self.pending.and_then(|p| p.deadline);
        match (scan, device) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Expires whatever deadline has passed at `now`.
    ///
    /// The reader is told to stop so a late result cannot revive the scan.
    pub fn check_timeout(&mut self, now: Instant) -> Option<ScanOutcome> {
        let after_secs = self.read_timeout.as_secs();

        if let Some(pending) = self.pending {
            if pending.deadline.is_some_and(|d| d <= now) {
                self.pending = None;
                self.issue_stop(ScanMethod::Uhf);
                warn!(operation = %pending.operation, after_secs, "Device operation timed out");
                return Some(ScanOutcome::Device(DeviceOutcome::Failed {
                    operation: pending.operation,
                    reason: ScanError::Timeout(after_secs).to_string(),
                }));
            }
        }

        if let ScanActivity::Active {
            method,
            purpose,
            deadline: Some(deadline),
            ..
        } = self.activity
        {
            if deadline <= now {
                self.stop_active();
                warn!(mode = %method, after_secs, "Scan timed out");
                return Some(ScanOutcome::TimedOut {
                    method,
                    purpose,
                    after_secs,
                });
            }
        }

        None
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let (active_mode, operation, purpose) = match self.activity {
            ScanActivity::Idle => (None, None, None),
            ScanActivity::Active {
                method,
                operation,
                purpose,
                ..
            } => (Some(method), Some(operation), Some(purpose)),
        };
        CoordinatorSnapshot {
            selected_mode: self.selected,
            active_mode,
            operation,
            purpose,
            device_operation: self.pending_operation(),
            uhf_active: active_mode == Some(ScanMethod::Uhf),
            barcode_active: active_mode == Some(ScanMethod::Barcode),
            continuous_inventory: self.continuous_inventory,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareCommand, SimulatedReader};

    fn coordinator(mode: ScanMethod) -> (ScanModeCoordinator, SimulatedReader) {
        let reader = SimulatedReader::new();
        let coordinator = ScanModeCoordinator::new(Arc::new(reader.clone()), mode);
        (coordinator, reader)
    }

    fn write_request() -> WriteTagRequest {
        WriteTagRequest {
            new_epc_hex: "413100000000000000000000".into(),
            target_epc_filter: None,
            access_password: "00000000".into(),
        }
    }

    #[test]
    fn test_single_read_resolves_and_returns_to_idle() {
        let (mut c, reader) = coordinator(ScanMethod::Uhf);
        let now = Instant::now();

        let outcome = c.toggle_scan(ScanPurpose::StockTake, now).unwrap();
        assert_eq!(outcome, ToggleOutcome::Started(ScanOperation::SingleRead));
        assert_eq!(c.next_deadline(), Some(now + Duration::from_secs(7)));

        let outcome = c.on_scan_event(ScanEvent::TagRead {
            epc: "EPC002".into(),
            tid: None,
        });
        assert!(matches!(
            outcome,
            ScanOutcome::Resolved(ResolvedScan { ref identifier, method: ScanMethod::Uhf, .. })
                if identifier == "EPC002"
        ));
        assert_eq!(c.activity(), ScanActivity::Idle);
        assert_eq!(c.next_deadline(), None);
        assert_eq!(reader.commands(), vec![HardwareCommand::ReadSingleTag]);
    }

    #[test]
    fn test_toggle_twice_is_user_stop() {
        let (mut c, reader) = coordinator(ScanMethod::Barcode);
        let now = Instant::now();
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();
        assert_eq!(
            c.toggle_scan(ScanPurpose::StockTake, now).unwrap(),
            ToggleOutcome::Stopped
        );
        assert_eq!(c.activity(), ScanActivity::Idle);
        assert_eq!(
            reader.commands(),
            vec![HardwareCommand::StartBarcodeScan, HardwareCommand::StopBarcodeScan]
        );
    }

    #[test]
    fn test_select_mode_stops_other_modality_first() {
        let (mut c, reader) = coordinator(ScanMethod::Barcode);
        let now = Instant::now();
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();

        c.select_mode(true);
        assert_eq!(c.activity(), ScanActivity::Idle);
        assert_eq!(c.selected_mode(), ScanMethod::Uhf);

        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();
        assert_eq!(
            reader.commands(),
            vec![
                HardwareCommand::StartBarcodeScan,
                HardwareCommand::StopBarcodeScan,
                HardwareCommand::ReadSingleTag,
            ]
        );

        // Late acknowledgment of the barcode stop must not end the UHF read.
        assert_eq!(c.on_scan_event(ScanEvent::OperationStopped), ScanOutcome::Ignored);
        assert_eq!(c.activity().active_method(), Some(ScanMethod::Uhf));
    }

    #[test]
    fn test_select_same_mode_is_noop() {
        let (mut c, reader) = coordinator(ScanMethod::Uhf);
        c.toggle_scan(ScanPurpose::StockTake, Instant::now()).unwrap();
        c.select_mode(true);
        assert_eq!(c.activity().active_method(), Some(ScanMethod::Uhf));
        assert_eq!(reader.commands(), vec![HardwareCommand::ReadSingleTag]);
    }

    #[test]
    fn test_timeout_stops_reader() {
        let (mut c, reader) = coordinator(ScanMethod::Uhf);
        let now = Instant::now();
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();

        assert_eq!(c.check_timeout(now + Duration::from_secs(6)), None);
        let outcome = c.check_timeout(now + Duration::from_secs(7)).unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::TimedOut {
                method: ScanMethod::Uhf,
                purpose: ScanPurpose::StockTake,
                after_secs: 7,
            }
        );
        assert_eq!(c.activity(), ScanActivity::Idle);
        assert_eq!(
            reader.commands(),
            vec![HardwareCommand::ReadSingleTag, HardwareCommand::StopOperation]
        );

        // A result arriving after the timeout is stale.
        let late = c.on_scan_event(ScanEvent::TagRead {
            epc: "E1".into(),
            tid: None,
        });
        assert_eq!(late, ScanOutcome::Ignored);
    }

    #[test]
    fn test_continuous_inventory_stays_active() {
        let (c, reader) = coordinator(ScanMethod::Uhf);
        let mut c = c.with_continuous_inventory(true);
        let now = Instant::now();

        assert_eq!(
            c.toggle_scan(ScanPurpose::StockTake, now).unwrap(),
            ToggleOutcome::Started(ScanOperation::Inventory)
        );
        assert_eq!(c.next_deadline(), None);

        for epc in ["E1", "E2", "E1"] {
            let outcome = c.on_scan_event(ScanEvent::InventoryTag { epc: epc.into() });
            assert!(matches!(outcome, ScanOutcome::Resolved(_)));
        }
        assert_eq!(c.activity().active_method(), Some(ScanMethod::Uhf));

        assert_eq!(
            c.on_scan_event(ScanEvent::InventoryFinished),
            ScanOutcome::Stopped {
                method: ScanMethod::Uhf
            }
        );
        assert_eq!(c.activity(), ScanActivity::Idle);
        assert_eq!(reader.commands(), vec![HardwareCommand::StartInventory]);
    }

    #[test]
    fn test_device_error_fails_scan() {
        let (mut c, _reader) = coordinator(ScanMethod::Barcode);
        c.toggle_scan(ScanPurpose::PairingSearch, Instant::now()).unwrap();
        let outcome = c.on_scan_event(ScanEvent::DeviceError {
            message: "imager jammed".into(),
        });
        assert_eq!(
            outcome,
            ScanOutcome::ScanFailed {
                method: ScanMethod::Barcode,
                purpose: ScanPurpose::PairingSearch,
                reason: "imager jammed".into(),
            }
        );
        assert_eq!(c.activity(), ScanActivity::Idle);
    }

    #[test]
    fn test_refused_start_stays_idle() {
        let (mut c, reader) = coordinator(ScanMethod::Uhf);
        reader.refuse_commands(Some("reader not connected"));
        let result = c.toggle_scan(ScanPurpose::StockTake, Instant::now());
        assert!(matches!(result, Err(ScanError::Device(_))));
        assert_eq!(c.activity(), ScanActivity::Idle);
    }

    #[test]
    fn test_busy_reader_refuses_scans() {
        let (mut c, _reader) = coordinator(ScanMethod::Uhf);
        let now = Instant::now();
        c.write_tag(&write_request()).unwrap();

        assert!(matches!(
            c.toggle_scan(ScanPurpose::StockTake, now),
            Err(ScanError::Busy(DeviceOperation::WriteEpc))
        ));
        assert!(matches!(c.read_tid(now), Err(ScanError::Busy(_))));

        let outcome = c.on_scan_event(ScanEvent::WriteResult {
            success: true,
            epc: None,
            error: None,
        });
        assert!(matches!(
            outcome,
            ScanOutcome::Device(DeviceOutcome::WriteCompleted { success: true, .. })
        ));
        assert!(!c.is_busy());
    }

    #[test]
    fn test_device_operation_refused_while_scanning() {
        let (mut c, _reader) = coordinator(ScanMethod::Barcode);
        c.toggle_scan(ScanPurpose::StockTake, Instant::now()).unwrap();
        assert!(matches!(
            c.write_tag(&write_request()),
            Err(ScanError::ModeConflict { .. })
        ));
        assert!(!c.is_busy());
    }

    #[test]
    fn test_tid_read_times_out() {
        let (mut c, _reader) = coordinator(ScanMethod::Uhf);
        let now = Instant::now();
        c.read_tid(now).unwrap();
        let outcome = c.check_timeout(now + Duration::from_secs(8)).unwrap();
        assert!(matches!(
            outcome,
            ScanOutcome::Device(DeviceOutcome::Failed {
                operation: DeviceOperation::ReadTid,
                ..
            })
        ));
        assert!(!c.is_busy());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (mut c, reader) = coordinator(ScanMethod::Uhf);
        c.toggle_scan(ScanPurpose::StockTake, Instant::now()).unwrap();
        c.clear();
        c.clear();
        assert_eq!(c.activity(), ScanActivity::Idle);
        assert_eq!(
            reader.commands(),
            vec![HardwareCommand::ReadSingleTag, HardwareCommand::StopOperation]
        );
    }

    #[test]
    fn test_clear_reports_cut_off_device_operation() {
        let (mut c, reader) = coordinator(ScanMethod::Uhf);
        c.write_tag(&write_request()).unwrap();

        assert_eq!(c.clear(), Some(DeviceOperation::WriteEpc));
        assert_eq!(c.clear(), None);
        assert!(!c.is_busy());
        assert_eq!(c.pending_operation(), None);
        assert_eq!(
            reader.commands().last(),
            Some(&HardwareCommand::StopOperation)
        );

        // A write result arriving after the cancel answers nothing.
        assert_eq!(
            c.on_scan_event(ScanEvent::WriteResult {
                success: true,
                epc: None,
                error: None,
            }),
            ScanOutcome::Ignored
        );
    }

    #[test]
    fn test_unanswered_stops_do_not_swallow_later_scan_end() {
        let (mut c, reader) = coordinator(ScanMethod::Barcode);
        let now = Instant::now();

        // Start, stop with no acknowledgment, start again.
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();
        assert_eq!(c.activity().active_method(), Some(ScanMethod::Barcode));

        // The reader ending the running scan is reported, not swallowed.
        assert_eq!(
            c.on_scan_event(ScanEvent::OperationStopped),
            ScanOutcome::Stopped {
                method: ScanMethod::Barcode
            }
        );
        assert_eq!(c.activity(), ScanActivity::Idle);
        assert_eq!(
            reader.commands(),
            vec![
                HardwareCommand::StartBarcodeScan,
                HardwareCommand::StopBarcodeScan,
                HardwareCommand::StartBarcodeScan,
            ]
        );
    }

    #[test]
    fn test_stale_stop_forgotten_once_reader_answers_active_scan() {
        let (mut c, _reader) = coordinator(ScanMethod::Barcode);
        let now = Instant::now();
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();

        // Switch to continuous UHF inventory; the barcode stop is never acknowledged.
        let mut c = c.with_continuous_inventory(true);
        c.select_mode(true);
        c.toggle_scan(ScanPurpose::StockTake, now).unwrap();
        assert!(matches!(
            c.on_scan_event(ScanEvent::InventoryTag { epc: "E1".into() }),
            ScanOutcome::Resolved(_)
        ));

        assert_eq!(
            c.on_scan_event(ScanEvent::OperationStopped),
            ScanOutcome::Stopped {
                method: ScanMethod::Uhf
            }
        );
        assert_eq!(c.activity(), ScanActivity::Idle);
    }

    #[test]
    fn test_idle_events() {
        let (mut c, _reader) = coordinator(ScanMethod::Uhf);
        assert_eq!(
            c.on_scan_event(ScanEvent::BarcodeRead { code: "B1".into() }),
            ScanOutcome::Ignored
        );
        assert!(matches!(
            c.on_scan_event(ScanEvent::DeviceError {
                message: "battery low".into()
            }),
            ScanOutcome::Fault { .. }
        ));
    }

    /// Every sequence of mode/toggle/event steps up to length 5 keeps at
    /// most one modality active, and no scan ever starts while the other
    /// modality is running.
    #[test]
    fn test_mutual_exclusion_over_all_short_sequences() {
        #[derive(Clone, Copy, Debug)]
        enum Step {
            SelectUhf,
            SelectBarcode,
            Toggle,
            TagRead,
            BarcodeRead,
            Stopped,
            Clear,
        }
        const STEPS: [Step; 7] = [
            Step::SelectUhf,
            Step::SelectBarcode,
            Step::Toggle,
            Step::TagRead,
            Step::BarcodeRead,
            Step::Stopped,
            Step::Clear,
        ];

        let mut sequences: Vec<Vec<Step>> = vec![vec![]];
        for _ in 0..5 {
            sequences = sequences
                .into_iter()
                .flat_map(|seq| {
                    STEPS.into_iter().map(move |step| {
                        let mut next = seq.clone();
                        next.push(step);
                        next
                    })
                })
                .collect();
        }

        let now = Instant::now();
        for sequence in sequences {
            let (mut c, _reader) = coordinator(ScanMethod::Barcode);
            for step in &sequence {
                let before = c.snapshot();
                match step {
                    Step::SelectUhf => c.select_mode(true),
                    Step::SelectBarcode => c.select_mode(false),
                    Step::Toggle => {
                        if let Ok(ToggleOutcome::Started(_)) =
                            c.toggle_scan(ScanPurpose::StockTake, now)
                        {
                            assert_eq!(before.active_mode, None, "{:?}", sequence);
                        }
                    }
                    Step::TagRead => {
                        c.on_scan_event(ScanEvent::TagRead {
                            epc: "E1".into(),
                            tid: None,
                        });
                    }
                    Step::BarcodeRead => {
                        c.on_scan_event(ScanEvent::BarcodeRead { code: "B1".into() });
                    }
                    Step::Stopped => {
                        c.on_scan_event(ScanEvent::OperationStopped);
                    }
                    Step::Clear => {
                        c.clear();
                    }
                }
                let after = c.snapshot();
                assert!(!(after.uhf_active && after.barcode_active), "{:?}", sequence);
                if let Some(active) = after.active_mode {
                    assert_eq!(active, after.selected_mode, "{:?}", sequence);
                }
            }
        }
    }
}
