//! # Tag Pairing Workflow
//!
//! Drives [`PairingMachine`] against the reader and the catalog store.
//!
//! ```text
//! search_by_item_code ──► store.find_by_item_code ──► machine.apply_lookup
//!
//! start_pairing ──► machine.begin_pairing ──► coordinator.write_tag
//!                                                   │ WriteResult
//! on_device_outcome ◄───────────────────────────────┘
//!     │ ok: coordinator.read_tid
//!     │                                             │ TagRead (TID)
//! on_device_outcome ◄───────────────────────────────┘
//!     │ ok: store.update_pairing ──► store.find_by_item_code ──► on_saved
//!     │
//!     └ any failure: machine → ProcessFailed,
//!                    store.update_pairing(WriteFailed | PairingFailed)
//! ```
//!
//! A recorded failure never carries an EPC or TID, so the tag the entry was
//! paired with before (if any) stays on record until a run succeeds.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use opname_core::epc::decode_item_code_prefix;
use opname_core::pairing::{
    PairingFailure, PairingMachine, PairingSnapshot, PairingStep, TaggingState, WriteTagRequest,
};
use opname_core::validation::{normalize_epc, normalize_item_code};
use opname_core::{CoreError, PairingRecord, ScanMethod, ValidationError};

use crate::coordinator::{DeviceOperation, DeviceOutcome, ResolvedScan, ScanModeCoordinator};
use crate::error::ScanResult;
use crate::store::CatalogStore;

/// One pairing run at a time, for one reader.
#[derive(Debug, Clone)]
pub struct TagPairingWorkflow {
    machine: PairingMachine,
    access_password: String,
    verify_written_epc: bool,
}

impl TagPairingWorkflow {
    pub fn new(access_password: impl Into<String>, verify_written_epc: bool) -> Self {
        TagPairingWorkflow {
            machine: PairingMachine::new(),
            access_password: access_password.into(),
            verify_written_epc,
        }
    }

    pub fn state(&self) -> TaggingState {
        self.machine.state()
    }

    pub fn machine(&self) -> &PairingMachine {
        &self.machine
    }

    pub fn snapshot(&self) -> PairingSnapshot {
        self.machine.snapshot()
    }

    fn ensure_not_in_flight(&self) -> ScanResult<()> {
        let state = self.machine.state();
        if state.is_in_flight() {
            return Err(CoreError::PairingNotReady { state }.into());
        }
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Looks up the entry to pair.
    ///
    /// Ends in `BookFoundUntagged`, `BookFoundAlreadyTagged` or
    /// `ErrorBookNotFound`. A storage error leaves the state unchanged.
    pub async fn search_by_item_code(
        &mut self,
        query: &str,
        store: &dyn CatalogStore,
    ) -> ScanResult<TaggingState> {
        self.ensure_not_in_flight()?;

        let code = normalize_item_code(query);
        if code.is_empty() {
            return Err(ValidationError::Required {
                field: "item_code".to_string(),
            }
            .into());
        }

        let entry = store.find_by_item_code(&code).await?;
        let state = self.machine.apply_lookup(&code, entry)?;
        info!(item_code = %code, ?state, "Pairing lookup");
        Ok(state)
    }

    /// Looks up the entry from a scan.
    ///
    /// Barcodes are item codes. A UHF tag is matched by its paired EPC first;
    /// failing that, an EPC derived from an item code is decoded back.
    pub async fn search_by_scan(
        &mut self,
        scan: &ResolvedScan,
        store: &dyn CatalogStore,
    ) -> ScanResult<TaggingState> {
        if scan.method == ScanMethod::Barcode {
            return self.search_by_item_code(&scan.identifier, store).await;
        }

        self.ensure_not_in_flight()?;
        let epc = normalize_epc(&scan.identifier);
        if epc.is_empty() {
            return Err(ValidationError::Required {
                field: "epc".to_string(),
            }
            .into());
        }

        let mut entry = store.find_by_rfid_tag(&epc).await?;
        if entry.is_none() {
            if let Some(code) = decode_item_code_prefix(&epc).filter(|c| !c.trim().is_empty()) {
                debug!(%epc, item_code = %code, "Trying item code decoded from EPC");
                entry = store.find_by_item_code(&code).await?;
            }
        }

        let state = self.machine.apply_lookup(&epc, entry)?;
        info!(%epc, ?state, "Pairing lookup by tag");
        Ok(state)
    }

    // =========================================================================
    // Device Steps
    // =========================================================================

    /// Starts (or retries) pairing the looked-up entry and issues the write.
    ///
    /// ## Errors
    /// - `Busy` / `ModeConflict` if the reader is not idle (state unchanged)
    /// - `Core(PairingNotReady)` unless an entry was found or the last run failed
    /// - `Core(Validation)` for a bad target EPC or access password; the run
    ///   is then `ProcessFailed` and nothing reached the reader
    /// - `Device` if the reader refused the write; the run is `ProcessFailed`
    pub async fn start_pairing(
        &mut self,
        coordinator: &mut ScanModeCoordinator,
        store: &dyn CatalogStore,
    ) -> ScanResult<WriteTagRequest> {
        coordinator.ensure_ready()?;

        let request = self.machine.begin_pairing(&self.access_password)?;

        if let Err(err) = coordinator.write_tag(&request) {
            let failure = self.machine.on_device_failure(err.to_string())?;
            self.record_failure(&failure, store).await;
            return Err(err);
        }

        info!(epc = %request.new_epc_hex, "EPC write requested");
        Ok(request)
    }

    /// Feeds the answer to a write or TID read. Returns the new state.
    pub async fn on_device_outcome(
        &mut self,
        outcome: DeviceOutcome,
        coordinator: &mut ScanModeCoordinator,
        store: &dyn CatalogStore,
        now: Instant,
    ) -> ScanResult<TaggingState> {
        let step = match outcome {
            DeviceOutcome::WriteCompleted {
                success,
                epc,
                error,
            } => self.machine.on_write_result(success, epc, error)?,
            DeviceOutcome::TidRead { epc, tid } => {
                self.machine
                    .on_tid_read(&epc, tid, self.verify_written_epc, Utc::now())?
            }
            DeviceOutcome::Failed { reason, .. } => {
                PairingStep::Failed(self.machine.on_device_failure(reason)?)
            }
            DeviceOutcome::LockCompleted { .. } => {
                debug!("Lock result is not part of a pairing run");
                return Ok(self.machine.state());
            }
        };

        match step {
            PairingStep::ReadTid => {
                if let Err(err) = coordinator.read_tid(now) {
                    let failure = self.machine.on_device_failure(err.to_string())?;
                    self.record_failure(&failure, store).await;
                } else {
                    debug!("TID read requested");
                }
            }
            PairingStep::Persist(record) => self.persist_success(record, store).await?,
            PairingStep::Failed(failure) => self.record_failure(&failure, store).await,
        }

        Ok(self.machine.state())
    }

    async fn persist_success(
        &mut self,
        record: PairingRecord,
        store: &dyn CatalogStore,
    ) -> ScanResult<()> {
        if let Err(err) = store.update_pairing(&record).await {
            warn!(item_code = %record.item_code, error = %err, "Failed to save pairing");
            self.machine.on_save_failed(err.to_string())?;
            return Ok(());
        }

        match store.find_by_item_code(&record.item_code).await {
            Ok(Some(entry)) => {
                info!(
                    item_code = %entry.item_code,
                    epc = ?entry.rfid_tag_hex,
                    tid = ?entry.tid,
                    "Tag paired"
                );
                self.machine.on_saved(entry)?;
            }
            Ok(None) => {
                self.machine
                    .on_save_failed(format!("{} vanished after pairing", record.item_code))?;
            }
            Err(err) => {
                self.machine.on_save_failed(err.to_string())?;
            }
        }
        Ok(())
    }

    /// Records `WriteFailed` / `PairingFailed` on the entry, best effort.
    async fn record_failure(&self, failure: &PairingFailure, store: &dyn CatalogStore) {
        warn!(stage = ?failure.stage, reason = %failure.reason, "Pairing failed");

        let (status, target) = match (failure.persisted_status(), self.machine.target()) {
            (Some(status), Some(target)) => (status, target),
            _ => return,
        };

        let record = PairingRecord {
            item_code: target.item_code.clone(),
            rfid_tag_hex: None,
            tid: None,
            status,
            timestamp: Utc::now(),
        };
        if let Err(err) = store.update_pairing(&record).await {
            warn!(item_code = %record.item_code, error = %err, "Could not record pairing failure");
        }
    }

    /// Clears the run and stops the write or TID read it had outstanding.
    pub fn reset(&mut self, coordinator: &mut ScanModeCoordinator) {
        if matches!(
            coordinator.pending_operation(),
            Some(DeviceOperation::WriteEpc | DeviceOperation::ReadTid)
        ) {
            coordinator.cancel_device_operation();
        }
        self.machine.reset();
        debug!("Pairing workflow reset");
    }
}
