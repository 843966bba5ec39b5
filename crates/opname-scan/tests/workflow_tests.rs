//! Pairing and stock-take workflows driven directly, with a store whose
//! writes can be made to fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use opname_core::pairing::{FailureStage, TaggingState};
use opname_core::reconciliation::ScanResolution;
use opname_core::{
    CatalogEntry, OpnameStatus, PairingRecord, PairingStatus, ScanMethod, SessionReport, Sighting,
};
use opname_db::{Database, DbConfig};
use opname_scan::{
    CatalogStore, DeviceOutcome, HardwareCommand, ResolvedScan, ScanError, ScanEvent,
    ScanModeCoordinator, ScanOutcome, ScanPurpose, ScanResult, SimulatedReader, StockTakeFlow,
    TagPairingWorkflow,
};
use tokio::time::Instant;

/// Delegates to a real database; writes fail while `fail_writes` is set.
struct FlakyStore {
    db: Database,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    async fn new() -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        catalog
            .insert(&CatalogEntry::new("A1", "Middlemarch", "Shelf A"))
            .await
            .unwrap();
        catalog
            .insert(&CatalogEntry::new("B002", "Emma", "Shelf B").with_tag("EPC002"))
            .await
            .unwrap();
        FlakyStore {
            db,
            fail_writes: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check_write(&self) -> ScanResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ScanError::Persistence("database is locked".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn load_catalog(&self) -> ScanResult<Vec<CatalogEntry>> {
        self.db.load_catalog().await
    }

    async fn find_by_item_code(&self, item_code: &str) -> ScanResult<Option<CatalogEntry>> {
        self.db.find_by_item_code(item_code).await
    }

    async fn find_by_rfid_tag(&self, epc: &str) -> ScanResult<Option<CatalogEntry>> {
        self.db.find_by_rfid_tag(epc).await
    }

    async fn update_pairing(&self, record: &PairingRecord) -> ScanResult<()> {
        self.check_write()?;
        self.db.update_pairing(record).await
    }

    async fn record_sighting(&self, sighting: &Sighting) -> ScanResult<()> {
        self.check_write()?;
        self.db.record_sighting(sighting).await
    }

    async fn reset_opname(&self) -> ScanResult<u64> {
        self.check_write()?;
        self.db.reset_opname().await
    }

    async fn save_session_report(&self, report: &SessionReport) -> ScanResult<String> {
        self.check_write()?;
        self.db.save_session_report(report).await
    }
}

fn coordinator(reader: &SimulatedReader) -> ScanModeCoordinator {
    ScanModeCoordinator::new(Arc::new(reader.clone()), ScanMethod::Uhf)
}

fn device_outcome(coordinator: &mut ScanModeCoordinator, event: ScanEvent) -> DeviceOutcome {
    match coordinator.on_scan_event(event) {
        ScanOutcome::Device(outcome) => outcome,
        other => panic!("expected a device outcome, got {:?}", other),
    }
}

// =============================================================================
// Pairing
// =============================================================================

#[tokio::test]
async fn test_failed_save_ends_in_process_failed() {
    let store = FlakyStore::new().await;
    let reader = SimulatedReader::new();
    let mut coordinator = coordinator(&reader);
    let mut pairing = TagPairingWorkflow::new("00000000", true);

    pairing.search_by_item_code("A1", &store).await.unwrap();
    let request = pairing.start_pairing(&mut coordinator, &store).await.unwrap();

    let write = device_outcome(
        &mut coordinator,
        ScanEvent::WriteResult {
            success: true,
            epc: None,
            error: None,
        },
    );
    let state = pairing
        .on_device_outcome(write, &mut coordinator, &store, Instant::now())
        .await
        .unwrap();
    assert_eq!(state, TaggingState::ReadingTid);

    store.set_failing(true);
    let tid = device_outcome(
        &mut coordinator,
        ScanEvent::TagRead {
            epc: request.new_epc_hex.clone(),
            tid: Some("E200341201".to_string()),
        },
    );
    let state = pairing
        .on_device_outcome(tid, &mut coordinator, &store, Instant::now())
        .await
        .unwrap();

    assert_eq!(state, TaggingState::ProcessFailed);
    let failure = pairing.machine().failure().unwrap();
    assert_eq!(failure.stage, FailureStage::Persist);
    assert!(failure.reason.contains("database is locked"));

    store.set_failing(false);
    let entry = store.db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.pairing_status, PairingStatus::NotPaired);
    assert!(entry.rfid_tag_hex.is_none());
}

#[tokio::test]
async fn test_refused_write_records_write_failed() {
    let store = FlakyStore::new().await;
    let reader = SimulatedReader::new();
    let mut coordinator = coordinator(&reader);
    let mut pairing = TagPairingWorkflow::new("00000000", true);

    pairing.search_by_item_code("A1", &store).await.unwrap();
    reader.refuse_commands(Some("reader offline"));

    let err = pairing
        .start_pairing(&mut coordinator, &store)
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Device(_)));
    assert_eq!(pairing.state(), TaggingState::ProcessFailed);
    assert!(coordinator.pending_operation().is_none());

    let entry = store.db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.pairing_status, PairingStatus::WriteFailed);

    // Retrying once the reader is back starts a new write
    reader.refuse_commands(None);
    pairing.start_pairing(&mut coordinator, &store).await.unwrap();
    assert_eq!(pairing.state(), TaggingState::WritingEpc);
    assert!(matches!(
        reader.commands().as_slice(),
        [HardwareCommand::WriteTag(_)]
    ));
}

#[tokio::test]
async fn test_read_back_mismatch_records_pairing_failed() {
    let store = FlakyStore::new().await;
    let reader = SimulatedReader::new();
    let mut coordinator = coordinator(&reader);
    let mut pairing = TagPairingWorkflow::new("00000000", true);

    pairing.search_by_item_code("A1", &store).await.unwrap();
    pairing.start_pairing(&mut coordinator, &store).await.unwrap();

    let write = device_outcome(
        &mut coordinator,
        ScanEvent::WriteResult {
            success: true,
            epc: None,
            error: None,
        },
    );
    pairing
        .on_device_outcome(write, &mut coordinator, &store, Instant::now())
        .await
        .unwrap();

    let tid = device_outcome(
        &mut coordinator,
        ScanEvent::TagRead {
            epc: "DEADBEEF".to_string(),
            tid: Some("E200341201".to_string()),
        },
    );
    let state = pairing
        .on_device_outcome(tid, &mut coordinator, &store, Instant::now())
        .await
        .unwrap();
    assert_eq!(state, TaggingState::ProcessFailed);
    assert_eq!(
        pairing.machine().failure().unwrap().stage,
        FailureStage::TidRead
    );

    let entry = store.db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.pairing_status, PairingStatus::PairingFailed);
    assert!(entry.tid.is_none());
}

#[tokio::test]
async fn test_uhf_search_decodes_item_code_from_epc() {
    let store = FlakyStore::new().await;
    let mut pairing = TagPairingWorkflow::new("00000000", true);

    let scan = ResolvedScan {
        identifier: "413100000000000000000000".to_string(),
        method: ScanMethod::Uhf,
        purpose: ScanPurpose::PairingSearch,
        tid: None,
    };
    let state = pairing.search_by_scan(&scan, &store).await.unwrap();
    assert_eq!(state, TaggingState::BookFoundUntagged);
    assert_eq!(pairing.snapshot().item_code.as_deref(), Some("A1"));

    let tagged = ResolvedScan {
        identifier: "epc002".to_string(),
        ..scan
    };
    let state = pairing.search_by_scan(&tagged, &store).await.unwrap();
    assert_eq!(state, TaggingState::BookFoundAlreadyTagged);
}

#[tokio::test]
async fn test_search_rejected_while_writing() {
    let store = FlakyStore::new().await;
    let reader = SimulatedReader::new();
    let mut coordinator = coordinator(&reader);
    let mut pairing = TagPairingWorkflow::new("00000000", true);

    pairing.search_by_item_code("A1", &store).await.unwrap();
    pairing.start_pairing(&mut coordinator, &store).await.unwrap();

    let err = pairing.search_by_item_code("B002", &store).await.unwrap_err();
    assert!(matches!(err, ScanError::Core(_)));
    assert_eq!(pairing.state(), TaggingState::WritingEpc);

    pairing.reset(&mut coordinator);
    let err = pairing.search_by_item_code("   ", &store).await.unwrap_err();
    assert!(err.is_validation_error());
    assert_eq!(pairing.state(), TaggingState::Idle);
}

// =============================================================================
// Stock-take
// =============================================================================

#[tokio::test]
async fn test_failed_sighting_write_leaves_session_unchanged() {
    let store = FlakyStore::new().await;
    let mut flow = StockTakeFlow::new(true);
    flow.start(&store, None).await.unwrap();

    store.set_failing(true);
    let err = flow
        .resolve("A1", ScanMethod::Barcode, &store)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(flow.counts().unwrap().found, 0);

    // The operator retries without re-scanning anything else
    store.set_failing(false);
    let resolution = flow
        .resolve("A1", ScanMethod::Barcode, &store)
        .await
        .unwrap();
    assert!(matches!(resolution, ScanResolution::Found { .. }));
    assert_eq!(flow.counts().unwrap().found, 1);

    let entry = store.db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.opname_status, OpnameStatus::Found);
    assert_eq!(entry.last_scan_method, Some(ScanMethod::Barcode));
}

#[tokio::test]
async fn test_failed_report_save_keeps_session_open() {
    let store = FlakyStore::new().await;
    let mut flow = StockTakeFlow::new(false);
    flow.start(&store, Some("Stacks".to_string())).await.unwrap();
    flow.resolve("EPC002", ScanMethod::Uhf, &store).await.unwrap();

    store.set_failing(true);
    assert!(flow.finalize("Audit", &store).await.is_err());
    assert!(!flow.snapshot().unwrap().closed);

    store.set_failing(false);
    let report = flow.finalize("Audit", &store).await.unwrap();
    assert_eq!(report.found_count, 1);
    assert_eq!(report.missing_count, 1);
    assert!(flow.snapshot().unwrap().closed);
}

#[tokio::test]
async fn test_sightings_not_persisted_when_disabled() {
    let store = FlakyStore::new().await;
    let mut flow = StockTakeFlow::new(false);
    flow.start(&store, None).await.unwrap();

    // Writes would fail, but none are attempted
    store.set_failing(true);
    let resolution = flow.resolve("A1", ScanMethod::Barcode, &store).await.unwrap();
    assert!(resolution.changed_session());

    let entry = store.db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.opname_status, OpnameStatus::NotScanned);
}
