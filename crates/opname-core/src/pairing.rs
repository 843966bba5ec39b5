//! # Tag Pairing State Machine
//!
//! The pure half of the tag-pairing workflow: a transition table for
//! [`TaggingState`] and a [`PairingMachine`] that applies lookups and device
//! results to it. The async driver in `opname-scan` feeds reader events into
//! this machine and performs whatever I/O the returned [`PairingStep`] asks for.
//!
//! ## State Graph
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──lookup──► BookFoundUntagged ─┐                                 │
//! │     │              BookFoundAlreadyTagged ─┤                            │
//! │     └────────────► ErrorBookNotFound       │ start pairing              │
//! │                                            ▼                            │
//! │                               AwaitingTagPlacement                      │
//! │                                            │ write request              │
//! │                                            ▼                            │
//! │                                       WritingEpc ─────────┐             │
//! │                                            │ write ok     │             │
//! │                                            ▼              │             │
//! │                                       ReadingTid ─────────┤ failure     │
//! │                                            │ TID ok       │             │
//! │                                            ▼              ▼             │
//! │                                       SavingToDb ──► ProcessFailed      │
//! │                                            │ saved        │ retry       │
//! │                                            ▼              └──► Awaiting │
//! │                                      ProcessSuccess                     │
//! │                                                                         │
//! │   Any state ──reset──► Idle                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Terminal states (found/error/success/failed) are only left through a new
//! lookup, an explicit start/retry, or a reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::epc::{derive_target_epc, epc_matches};
use crate::error::{CoreError, CoreResult};
use crate::types::{CatalogEntry, PairingRecord, PairingStatus};
use crate::validation::{normalize_epc, validate_access_password, validate_epc_hex};

// =============================================================================
// Tagging State
// =============================================================================

/// Steps of a pairing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaggingState {
    #[default]
    Idle,
    BookFoundUntagged,
    BookFoundAlreadyTagged,
    ErrorBookNotFound,
    AwaitingTagPlacement,
    WritingEpc,
    ReadingTid,
    SavingToDb,
    ProcessSuccess,
    ProcessFailed,
}

impl TaggingState {
    /// States in which a device or storage operation is outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            TaggingState::AwaitingTagPlacement
                | TaggingState::WritingEpc
                | TaggingState::ReadingTid
                | TaggingState::SavingToDb
        )
    }
}

use TaggingState::*;

/// Allowed edges of the pairing graph, as data.
///
/// Reset to [`TaggingState::Idle`] is accepted from every state and is not
/// listed here.
pub const TRANSITIONS: &[(TaggingState, &[TaggingState])] = &[
    (Idle, &[BookFoundUntagged, BookFoundAlreadyTagged, ErrorBookNotFound]),
    (
        BookFoundUntagged,
        &[
            BookFoundUntagged,
            BookFoundAlreadyTagged,
            ErrorBookNotFound,
            AwaitingTagPlacement,
        ],
    ),
    (
        BookFoundAlreadyTagged,
        &[
            BookFoundUntagged,
            BookFoundAlreadyTagged,
            ErrorBookNotFound,
            AwaitingTagPlacement,
        ],
    ),
    (
        ErrorBookNotFound,
        &[BookFoundUntagged, BookFoundAlreadyTagged, ErrorBookNotFound],
    ),
    (AwaitingTagPlacement, &[WritingEpc, ProcessFailed]),
    (WritingEpc, &[ReadingTid, ProcessFailed]),
    (ReadingTid, &[SavingToDb, ProcessFailed]),
    (SavingToDb, &[ProcessSuccess, ProcessFailed]),
    (
        ProcessSuccess,
        &[BookFoundUntagged, BookFoundAlreadyTagged, ErrorBookNotFound],
    ),
    (
        ProcessFailed,
        &[
            BookFoundUntagged,
            BookFoundAlreadyTagged,
            ErrorBookNotFound,
            AwaitingTagPlacement,
        ],
    ),
];

/// Checks whether the graph has an edge `from → to`.
pub fn can_transition(from: TaggingState, to: TaggingState) -> bool {
    if to == Idle {
        return true;
    }
    TRANSITIONS
        .iter()
        .find(|(state, _)| *state == from)
        .map(|(_, targets)| targets.contains(&to))
        .unwrap_or(false)
}

// =============================================================================
// Device Requests & Steps
// =============================================================================

/// Payload of a `write_tag` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteTagRequest {
    /// EPC to write, already validated.
    pub new_epc_hex: String,
    /// Restrict the write to a tag currently carrying this EPC.
    pub target_epc_filter: Option<String>,
    pub access_password: String,
}

/// Where a pairing run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Rejected locally; the reader was never asked to do anything.
    Validation,
    /// Placement or EPC write failed.
    Write,
    /// TID read-back failed or did not verify.
    TidRead,
    /// The catalog update failed.
    Persist,
}

/// A failed pairing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PairingFailure {
    pub stage: FailureStage,
    pub reason: String,
}

impl PairingFailure {
    /// Pairing status to record on the catalog entry, if any.
    ///
    /// Validation failures never touched the tag, and persistence failures
    /// cannot be recorded by the store that just failed.
    pub fn persisted_status(&self) -> Option<PairingStatus> {
        match self.stage {
            FailureStage::Write => Some(PairingStatus::WriteFailed),
            FailureStage::TidRead => Some(PairingStatus::PairingFailed),
            FailureStage::Validation | FailureStage::Persist => None,
        }
    }
}

/// What the driver must do after feeding a result into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingStep {
    /// Issue a TID read against the just-written tag.
    ReadTid,
    /// Persist the record, then report back with `on_saved`/`on_save_failed`.
    Persist(PairingRecord),
    /// The run ended in `ProcessFailed`.
    Failed(PairingFailure),
}

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable view of the pairing workflow for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PairingSnapshot {
    pub state: TaggingState,
    pub item_code: Option<String>,
    pub title: Option<String>,
    pub target_epc: Option<String>,
    pub scanned_epc: Option<String>,
    pub tid: Option<String>,
    /// Effective pairing status of the target, including in-flight steps.
    pub pairing_status: Option<PairingStatus>,
    pub failure: Option<PairingFailure>,
    pub message: String,
}

// =============================================================================
// Pairing Machine
// =============================================================================

/// Ephemeral state of one pairing run.
#[derive(Debug, Clone, Default)]
pub struct PairingMachine {
    state: TaggingState,
    target: Option<CatalogEntry>,
    target_epc: Option<String>,
    /// Why the target EPC could not be derived, if it could not.
    epc_error: Option<String>,
    scanned_epc: Option<String>,
    tid: Option<String>,
    failure: Option<PairingFailure>,
    message: String,
}

impl PairingMachine {
    pub fn new() -> Self {
        PairingMachine {
            message: "Search for an item to pair".to_string(),
            ..Default::default()
        }
    }

    pub fn state(&self) -> TaggingState {
        self.state
    }

    pub fn target(&self) -> Option<&CatalogEntry> {
        self.target.as_ref()
    }

    pub fn target_epc(&self) -> Option<&str> {
        self.target_epc.as_deref()
    }

    pub fn failure(&self) -> Option<&PairingFailure> {
        self.failure.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn transition(&mut self, to: TaggingState) -> CoreResult<()> {
        if !can_transition(self.state, to) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    fn fail(&mut self, stage: FailureStage, reason: impl Into<String>) -> CoreResult<PairingFailure> {
        self.transition(ProcessFailed)?;
        let failure = PairingFailure {
            stage,
            reason: reason.into(),
        };
        self.message = format!("Pairing failed: {}", failure.reason);
        self.failure = Some(failure.clone());
        Ok(failure)
    }

    /// Applies the result of a catalog lookup for `query`.
    ///
    /// Rejected while a device step is in flight.
    pub fn apply_lookup(
        &mut self,
        query: &str,
        entry: Option<CatalogEntry>,
    ) -> CoreResult<TaggingState> {
        let next = match &entry {
            None => ErrorBookNotFound,
            Some(e) if e.is_tagged() => BookFoundAlreadyTagged,
            Some(_) => BookFoundUntagged,
        };
        self.transition(next)?;

        self.target_epc = None;
        self.epc_error = None;
        self.scanned_epc = None;
        self.tid = None;
        self.failure = None;

        match entry {
            None => {
                self.target = None;
                self.message = format!("Item {} not found in catalog", query.trim());
            }
            Some(entry) => {
                match derive_target_epc(&entry.item_code) {
                    Ok(epc) => self.target_epc = Some(epc),
                    Err(err) => self.epc_error = Some(err.to_string()),
                }
                self.message = if next == BookFoundAlreadyTagged {
                    format!(
                        "{} is already tagged ({}); pairing will overwrite it",
                        entry.item_code,
                        entry.rfid_tag_hex.as_deref().unwrap_or_default()
                    )
                } else {
                    format!("{} found, ready to pair", entry.item_code)
                };
                self.target = Some(entry);
            }
        }

        Ok(next)
    }

    /// Starts (or retries) a pairing run and returns the write to issue.
    ///
    /// A blank or malformed target EPC, or a malformed access password, moves
    /// the run straight to `ProcessFailed` and returns the validation error;
    /// no request is produced in that case.
    pub fn begin_pairing(&mut self, access_password: &str) -> CoreResult<WriteTagRequest> {
        let ready = matches!(
            self.state,
            BookFoundUntagged | BookFoundAlreadyTagged | ProcessFailed
        );
        let item_code = match (&self.target, ready) {
            (Some(target), true) => target.item_code.clone(),
            _ => return Err(CoreError::PairingNotReady { state: self.state }),
        };

        self.transition(AwaitingTagPlacement)?;
        self.scanned_epc = None;
        self.tid = None;
        self.failure = None;
        self.message = format!("Place a tag on the reader for {}", item_code);

        let checked = match (&self.target_epc, &self.epc_error) {
            (Some(epc), _) => validate_epc_hex(epc).map(|_| epc.clone()),
            (None, Some(reason)) => {
                let reason = reason.clone();
                self.fail(FailureStage::Validation, reason.clone())?;
                return Err(CoreError::Validation(
                    crate::error::ValidationError::InvalidFormat {
                        field: "target_epc".to_string(),
                        reason,
                    },
                ));
            }
            (None, None) => validate_epc_hex("").map(|_| String::new()),
        }
        .and_then(|epc| validate_access_password(access_password).map(|_| epc));

        let new_epc_hex = match checked {
            Ok(epc) => epc,
            Err(err) => {
                self.fail(FailureStage::Validation, err.to_string())?;
                return Err(err.into());
            }
        };

        self.transition(WritingEpc)?;
        self.message = format!("Writing EPC {} for {}", new_epc_hex, item_code);

        Ok(WriteTagRequest {
            new_epc_hex,
            target_epc_filter: None,
            access_password: access_password.trim().to_string(),
        })
    }

    /// Feeds a `write_result` event.
    pub fn on_write_result(
        &mut self,
        success: bool,
        epc: Option<String>,
        error: Option<String>,
    ) -> CoreResult<PairingStep> {
        if self.state != WritingEpc {
            return Err(CoreError::PairingNotReady { state: self.state });
        }

        if !success {
            let reason = error.unwrap_or_else(|| "EPC write failed".to_string());
            return Ok(PairingStep::Failed(self.fail(FailureStage::Write, reason)?));
        }

        self.scanned_epc = epc
            .map(|e| normalize_epc(&e))
            .filter(|e| !e.is_empty())
            .or_else(|| self.target_epc.clone());
        self.transition(ReadingTid)?;
        self.message = "EPC written, reading TID".to_string();
        Ok(PairingStep::ReadTid)
    }

    /// Feeds the single-tag read that answers the TID request.
    ///
    /// With `verify_epc`, the EPC reported by the tag must equal the target.
    pub fn on_tid_read(
        &mut self,
        epc: &str,
        tid: Option<String>,
        verify_epc: bool,
        now: DateTime<Utc>,
    ) -> CoreResult<PairingStep> {
        if self.state != ReadingTid {
            return Err(CoreError::PairingNotReady { state: self.state });
        }

        let tid = match tid.map(|t| t.trim().to_uppercase()).filter(|t| !t.is_empty()) {
            Some(tid) => tid,
            None => {
                let failure = self.fail(FailureStage::TidRead, "Tag did not report a TID")?;
                return Ok(PairingStep::Failed(failure));
            }
        };

        let target_epc = self.target_epc.clone().unwrap_or_default();
        if verify_epc && !epc_matches(epc, &target_epc) {
            let failure = self.fail(
                FailureStage::TidRead,
                format!(
                    "Read-back EPC {} does not match written EPC {}",
                    normalize_epc(epc),
                    target_epc
                ),
            )?;
            return Ok(PairingStep::Failed(failure));
        }

        let item_code = self
            .target
            .as_ref()
            .map(|t| t.item_code.clone())
            .ok_or(CoreError::PairingNotReady { state: self.state })?;

        self.scanned_epc = Some(normalize_epc(epc));
        self.tid = Some(tid.clone());
        self.transition(SavingToDb)?;
        self.message = format!("TID {} read, saving", tid);

        Ok(PairingStep::Persist(PairingRecord {
            item_code,
            rfid_tag_hex: Some(target_epc),
            tid: Some(tid),
            status: PairingStatus::WriteSuccess,
            timestamp: now,
        }))
    }

    /// Aborts the in-flight device step (device error, read failure, timeout).
    pub fn on_device_failure(&mut self, reason: impl Into<String>) -> CoreResult<PairingFailure> {
        let stage = match self.state {
            AwaitingTagPlacement | WritingEpc => FailureStage::Write,
            ReadingTid => FailureStage::TidRead,
            state => return Err(CoreError::PairingNotReady { state }),
        };
        self.fail(stage, reason)
    }

    /// Completes the run with the entry as re-read from storage.
    pub fn on_saved(&mut self, entry: CatalogEntry) -> CoreResult<()> {
        if self.state != SavingToDb {
            return Err(CoreError::PairingNotReady { state: self.state });
        }
        self.transition(ProcessSuccess)?;
        self.message = format!(
            "Paired {} with {}",
            entry.item_code,
            entry.rfid_tag_hex.as_deref().unwrap_or_default()
        );
        self.target = Some(entry);
        Ok(())
    }

    /// Ends the run after the catalog update failed.
    pub fn on_save_failed(&mut self, reason: impl Into<String>) -> CoreResult<PairingFailure> {
        if self.state != SavingToDb {
            return Err(CoreError::PairingNotReady { state: self.state });
        }
        self.fail(FailureStage::Persist, reason)
    }

    /// Clears every ephemeral field and returns to `Idle`.
    pub fn reset(&mut self) {
        *self = PairingMachine::new();
    }

    /// Pairing status of the target as the operator should see it right now.
    pub fn effective_status(&self) -> Option<PairingStatus> {
        let stored = self.target.as_ref().map(|t| t.pairing_status)?;
        Some(match self.state {
            AwaitingTagPlacement => PairingStatus::PairingPending,
            WritingEpc | ReadingTid | SavingToDb => PairingStatus::WritePending,
            ProcessFailed => self
                .failure
                .as_ref()
                .and_then(PairingFailure::persisted_status)
                .unwrap_or(stored),
            _ => stored,
        })
    }

    pub fn snapshot(&self) -> PairingSnapshot {
        PairingSnapshot {
            state: self.state,
            item_code: self.target.as_ref().map(|t| t.item_code.clone()),
            title: self.target.as_ref().map(|t| t.title.clone()),
            target_epc: self.target_epc.clone(),
            scanned_epc: self.scanned_epc.clone(),
            tid: self.tid.clone(),
            pairing_status: self.effective_status(),
            failure: self.failure.clone(),
            message: self.message.clone(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_ACCESS_PASSWORD;

    fn found_machine(entry: CatalogEntry) -> PairingMachine {
        let mut machine = PairingMachine::new();
        let code = entry.item_code.clone();
        machine.apply_lookup(&code, Some(entry)).unwrap();
        machine
    }

    #[test]
    fn test_transition_table() {
        assert!(can_transition(Idle, BookFoundUntagged));
        assert!(can_transition(BookFoundUntagged, AwaitingTagPlacement));
        assert!(can_transition(WritingEpc, ReadingTid));
        assert!(can_transition(ReadingTid, ProcessFailed));
        assert!(can_transition(SavingToDb, Idle));

        // No skipping
        assert!(!can_transition(Idle, WritingEpc));
        assert!(!can_transition(BookFoundUntagged, WritingEpc));
        assert!(!can_transition(WritingEpc, SavingToDb));
        // Terminal states only leave through lookup/retry/reset
        assert!(!can_transition(ProcessSuccess, AwaitingTagPlacement));
        assert!(!can_transition(ErrorBookNotFound, AwaitingTagPlacement));
        assert!(!can_transition(Idle, ProcessFailed));
    }

    #[test]
    fn test_lookup_outcomes() {
        let mut machine = PairingMachine::new();
        assert_eq!(machine.apply_lookup("X9", None).unwrap(), ErrorBookNotFound);
        assert!(machine.target().is_none());

        let state = machine
            .apply_lookup("A1", Some(CatalogEntry::new("A1", "Atlas", "R1")))
            .unwrap();
        assert_eq!(state, BookFoundUntagged);
        assert_eq!(machine.target_epc(), Some("413100000000000000000000"));

        let tagged = CatalogEntry::new("A2", "Atlas II", "R1").with_tag("E200");
        let state = machine.apply_lookup("A2", Some(tagged)).unwrap();
        assert_eq!(state, BookFoundAlreadyTagged);
    }

    #[test]
    fn test_happy_path() {
        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));

        let request = machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();
        assert_eq!(machine.state(), WritingEpc);
        assert_eq!(request.new_epc_hex, "413100000000000000000000");
        assert_eq!(machine.effective_status(), Some(PairingStatus::WritePending));

        let step = machine
            .on_write_result(true, Some("413100000000000000000000".into()), None)
            .unwrap();
        assert_eq!(step, PairingStep::ReadTid);
        assert_eq!(machine.state(), ReadingTid);

        let now = Utc::now();
        let step = machine
            .on_tid_read("413100000000000000000000", Some("e2003412".into()), true, now)
            .unwrap();
        let record = match step {
            PairingStep::Persist(record) => record,
            other => panic!("unexpected step {:?}", other),
        };
        assert_eq!(record.item_code, "A1");
        assert_eq!(record.tid.as_deref(), Some("E2003412"));
        assert_eq!(record.status, PairingStatus::WriteSuccess);
        assert_eq!(machine.state(), SavingToDb);

        let saved = CatalogEntry::new("A1", "Atlas", "R1").with_tag("413100000000000000000000");
        machine.on_saved(saved).unwrap();
        assert_eq!(machine.state(), ProcessSuccess);
        assert_eq!(machine.effective_status(), Some(PairingStatus::WriteSuccess));
    }

    #[test]
    fn test_write_failure_never_reports_success() {
        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));
        machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();

        let step = machine
            .on_write_result(false, None, Some("timeout".into()))
            .unwrap();
        let failure = match step {
            PairingStep::Failed(f) => f,
            other => panic!("unexpected step {:?}", other),
        };
        assert_eq!(machine.state(), ProcessFailed);
        assert_eq!(failure.reason, "timeout");
        assert_eq!(failure.persisted_status(), Some(PairingStatus::WriteFailed));
        assert_eq!(machine.effective_status(), Some(PairingStatus::WriteFailed));
        assert_eq!(machine.target().unwrap().rfid_tag_hex, None);
    }

    #[test]
    fn test_retry_after_failure() {
        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));
        machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();
        machine.on_device_failure("reader disconnected").unwrap();
        assert_eq!(machine.state(), ProcessFailed);

        machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();
        assert_eq!(machine.state(), WritingEpc);
        assert!(machine.failure().is_none());
    }

    #[test]
    fn test_malformed_code_fails_before_device() {
        // Imported catalogs can carry codes the validator would reject.
        let mut machine = found_machine(CatalogEntry::new("BAD CODE", "Broken", "R1"));
        assert_eq!(machine.target_epc(), None);

        let result = machine.begin_pairing(DEFAULT_ACCESS_PASSWORD);
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(machine.state(), ProcessFailed);
        assert_eq!(
            machine.failure().map(|f| f.stage),
            Some(FailureStage::Validation)
        );
        assert_eq!(machine.failure().unwrap().persisted_status(), None);
    }

    #[test]
    fn test_bad_access_password_fails_locally() {
        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));
        assert!(machine.begin_pairing("xyz").is_err());
        assert_eq!(machine.state(), ProcessFailed);
    }

    #[test]
    fn test_tid_mismatch_fails() {
        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));
        machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();
        machine.on_write_result(true, None, None).unwrap();

        let step = machine
            .on_tid_read("DEADBEEF", Some("E200".into()), true, Utc::now())
            .unwrap();
        assert!(matches!(step, PairingStep::Failed(ref f) if f.stage == FailureStage::TidRead));
        assert_eq!(machine.effective_status(), Some(PairingStatus::PairingFailed));
    }

    #[test]
    fn test_missing_tid_fails() {
        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));
        machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();
        machine.on_write_result(true, None, None).unwrap();

        let step = machine
            .on_tid_read("413100000000000000000000", None, true, Utc::now())
            .unwrap();
        assert!(matches!(step, PairingStep::Failed(_)));
    }

    #[test]
    fn test_steps_out_of_order_are_rejected() {
        let mut machine = PairingMachine::new();
        assert!(matches!(
            machine.begin_pairing(DEFAULT_ACCESS_PASSWORD),
            Err(CoreError::PairingNotReady { state: Idle })
        ));
        assert!(machine.on_write_result(true, None, None).is_err());

        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));
        machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();
        // New lookup while the write is outstanding
        assert!(matches!(
            machine.apply_lookup("A2", None),
            Err(CoreError::InvalidTransition { from: WritingEpc, .. })
        ));
        assert_eq!(machine.state(), WritingEpc);
    }

    #[test]
    fn test_save_failure_and_reset() {
        let mut machine = found_machine(CatalogEntry::new("A1", "Atlas", "R1"));
        machine.begin_pairing(DEFAULT_ACCESS_PASSWORD).unwrap();
        machine.on_write_result(true, None, None).unwrap();
        machine
            .on_tid_read("413100000000000000000000", Some("E2".into()), true, Utc::now())
            .unwrap();

        let failure = machine.on_save_failed("disk full").unwrap();
        assert_eq!(failure.stage, FailureStage::Persist);
        assert_eq!(machine.state(), ProcessFailed);

        machine.reset();
        assert_eq!(machine.state(), Idle);
        assert!(machine.target().is_none());
        assert_eq!(machine.snapshot().pairing_status, None);
    }
}
