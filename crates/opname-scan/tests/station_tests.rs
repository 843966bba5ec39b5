//! End-to-end tests of the station actor: commands through the handle,
//! reader answers through `DeviceCallbacks`, results in the database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opname_core::pairing::TaggingState;
use opname_core::{
    CatalogEntry, OpnameStatus, PairingRecord, PairingStatus, SessionReport, Sighting,
};
use opname_db::{Database, DbConfig};
use opname_scan::{
    CatalogStore, DeviceCallbacks, HardwareCommand, LockAction, MemoryBank, ScanError,
    ScanPurpose, ScanResult, ScanStation, SimulatedReader, StationConfig, StationHandle,
    ToggleOutcome,
};

struct TestStation {
    handle: StationHandle,
    callbacks: DeviceCallbacks,
    reader: SimulatedReader,
}

fn test_config() -> StationConfig {
    let mut config = StationConfig::default();
    config.device.id = "handheld-test".to_string();
    config.session.location = Some("Reading Room".to_string());
    config
}

fn start_station(config: &StationConfig, store: Arc<dyn CatalogStore>) -> TestStation {
    let (callbacks, events) = DeviceCallbacks::channel();
    let reader = SimulatedReader::new();
    let handle = ScanStation::new(config, Arc::new(reader.clone()), store).start(events);
    TestStation {
        handle,
        callbacks,
        reader,
    }
}

async fn library_db() -> Arc<Database> {
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
    catalog
        .insert(&CatalogEntry::new("C3", "Persuasion", "Shelf C"))
        .await
        .unwrap();
    Arc::new(db)
}

/// A store with nothing in it, for tests that never reach persistence.
struct EmptyStore;

#[async_trait]
impl CatalogStore for EmptyStore {
    async fn load_catalog(&self) -> ScanResult<Vec<CatalogEntry>> {
        Ok(Vec::new())
    }

    async fn find_by_item_code(&self, _item_code: &str) -> ScanResult<Option<CatalogEntry>> {
        Ok(None)
    }

    async fn find_by_rfid_tag(&self, _epc: &str) -> ScanResult<Option<CatalogEntry>> {
        Ok(None)
    }

    async fn update_pairing(&self, _record: &PairingRecord) -> ScanResult<()> {
        Ok(())
    }

    async fn record_sighting(&self, _sighting: &Sighting) -> ScanResult<()> {
        Ok(())
    }

    async fn reset_opname(&self) -> ScanResult<u64> {
        Ok(0)
    }

    async fn save_session_report(&self, report: &SessionReport) -> ScanResult<String> {
        Ok(report.id.clone())
    }
}

// =============================================================================
// Stock-take
// =============================================================================

#[tokio::test]
async fn test_unknown_barcode_counts_as_new() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.start_session(None).await.unwrap();
    handle.select_mode(false).await.unwrap();
    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
    station.callbacks.on_barcode_scanned("X1");

    let snapshot = handle.snapshot().await.unwrap();
    let counts = snapshot.session.unwrap().counts;
    assert_eq!(counts.new, 1);
    assert_eq!(counts.found, 0);
    assert_eq!(counts.missing, 3);
    assert_eq!(counts.expected, 3);
    assert!(!snapshot.coordinator.barcode_active);
}

#[tokio::test]
async fn test_duplicate_uhf_read_counts_once() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.start_session(None).await.unwrap();

    for _ in 0..2 {
        let outcome = handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
        assert!(matches!(outcome, ToggleOutcome::Started(_)));
        station.callbacks.on_single_tag_read("EPC002", None);
        let counts = handle.snapshot().await.unwrap().session.unwrap().counts;
        assert_eq!(counts.found, 1);
        assert_eq!(counts.found + counts.missing, counts.expected);
    }

    let entry = db.catalog().find_by_item_code("B002").await.unwrap().unwrap();
    assert_eq!(entry.opname_status, OpnameStatus::Found);
    assert_eq!(entry.actual_scanned_location.as_deref(), Some("Reading Room"));
}

#[tokio::test]
async fn test_finalize_saves_report_and_closes_session() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.start_session(None).await.unwrap();
    handle.select_mode(false).await.unwrap();
    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
    station.callbacks.on_barcode_scanned("A1");
    handle.snapshot().await.unwrap();

    let report = handle.finalize_session("Weekly audit").await.unwrap();
    assert_eq!(report.expected_count, 3);
    assert_eq!(report.found_count, 1);
    assert_eq!(report.missing_count, 2);
    assert_eq!(report.new_count, 0);

    let saved = db.reports().list_reports(10).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].name, "Weekly audit");

    // The session is closed: a second finalize is refused
    let err = handle.finalize_session("Again").await.unwrap_err();
    assert!(matches!(err, ScanError::Core(_)));
}

#[tokio::test]
async fn test_resume_keeps_persisted_sightings() {
    let db = library_db().await;

    {
        let station = start_station(&test_config(), db.clone());
        station.handle.start_session(None).await.unwrap();
        station.handle.select_mode(false).await.unwrap();
        station
            .handle
            .toggle_scan(ScanPurpose::StockTake)
            .await
            .unwrap();
        station.callbacks.on_barcode_scanned("C3");
        station.handle.snapshot().await.unwrap();
        station.handle.shutdown().await.unwrap();
    }

    let station = start_station(&test_config(), db.clone());
    let session = station.handle.resume_session(None).await.unwrap();
    assert_eq!(session.counts.found, 1);
    assert_eq!(session.counts.missing, 2);
}

// =============================================================================
// Mode Switching
// =============================================================================

#[tokio::test]
async fn test_switching_to_uhf_stops_barcode_first() {
    let station = start_station(&test_config(), Arc::new(EmptyStore));
    let handle = &station.handle;

    handle.select_mode(false).await.unwrap();
    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();

    let coordinator = handle.select_mode(true).await.unwrap();
    assert!(!coordinator.barcode_active);
    assert!(!coordinator.uhf_active);

    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.coordinator.uhf_active);
    assert!(!snapshot.coordinator.barcode_active);

    assert_eq!(
        station.reader.commands(),
        vec![
            HardwareCommand::StartBarcodeScan,
            HardwareCommand::StopBarcodeScan,
            HardwareCommand::ReadSingleTag,
        ]
    );
}

#[tokio::test]
async fn test_reader_ending_restarted_scan_is_reported() {
    let station = start_station(&test_config(), Arc::new(EmptyStore));
    let handle = &station.handle;

    handle.select_mode(false).await.unwrap();
    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
    assert!(handle.snapshot().await.unwrap().coordinator.barcode_active);

    // Only one stop was ever requested and it was never acknowledged.
    station.callbacks.on_operation_stopped();

    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.coordinator.barcode_active);
    assert_eq!(snapshot.coordinator.active_mode, None);
    assert_eq!(
        station.reader.commands(),
        vec![
            HardwareCommand::StartBarcodeScan,
            HardwareCommand::StopBarcodeScan,
            HardwareCommand::StartBarcodeScan,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_read_times_out_after_seven_seconds() {
    let station = start_station(&test_config(), Arc::new(EmptyStore));
    let handle = &station.handle;

    handle.toggle_scan(ScanPurpose::StockTake).await.unwrap();
    assert!(handle.snapshot().await.unwrap().coordinator.uhf_active);

    tokio::time::sleep(Duration::from_secs(8)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.coordinator.active_mode, None);
    assert!(!snapshot.coordinator.uhf_active);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some(ScanError::Timeout(7).to_string().as_str())
    );
    assert_eq!(
        station.reader.commands(),
        vec![HardwareCommand::ReadSingleTag, HardwareCommand::StopOperation]
    );

    // A late answer after the timeout changes nothing
    station.callbacks.on_single_tag_read("EPC002", None);
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.coordinator.active_mode, None);
}

// =============================================================================
// Pairing
// =============================================================================

#[tokio::test]
async fn test_failed_write_is_recorded_without_success() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    let state = handle.search_item("A1").await.unwrap();
    assert_eq!(state, TaggingState::BookFoundUntagged);

    handle.start_pairing().await.unwrap();
    station
        .callbacks
        .on_write_result(false, None, Some("timeout".to_string()));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::ProcessFailed);
    assert!(snapshot.last_error.unwrap().contains("timeout"));

    let entry = db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_ne!(entry.pairing_status, PairingStatus::WriteSuccess);
    assert_eq!(entry.pairing_status, PairingStatus::WriteFailed);
    assert!(entry.rfid_tag_hex.is_none());
    assert!(entry.tid.is_none());
}

#[tokio::test]
async fn test_pairing_end_to_end() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.search_item("A1").await.unwrap();
    let request = handle.start_pairing().await.unwrap();

    station
        .callbacks
        .on_write_result(true, Some(request.new_epc_hex.clone()), None);
    handle.snapshot().await.unwrap();
    assert_eq!(
        station.reader.commands(),
        vec![
            HardwareCommand::WriteTag(request.clone()),
            HardwareCommand::ReadSingleTag,
        ]
    );

    station
        .callbacks
        .on_single_tag_read(request.new_epc_hex.clone(), Some("e2801160".to_string()));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::ProcessSuccess);
    assert!(snapshot.last_error.is_none());

    let entry = db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.rfid_tag_hex.as_deref(), Some(request.new_epc_hex.as_str()));
    assert_eq!(entry.tid.as_deref(), Some("E2801160"));
    assert_eq!(entry.pairing_status, PairingStatus::WriteSuccess);
    assert!(entry.pairing_timestamp.is_some());
}

#[tokio::test]
async fn test_reader_is_busy_during_pairing() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.search_item("A1").await.unwrap();
    handle.start_pairing().await.unwrap();

    let err = handle.toggle_scan(ScanPurpose::StockTake).await.unwrap_err();
    assert!(matches!(err, ScanError::Busy(_)));
    assert!(err.is_retryable());

    handle.reset_pairing().await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::Idle);
    assert_eq!(snapshot.coordinator.device_operation, None);
    assert_eq!(
        station.reader.commands().last(),
        Some(&HardwareCommand::StopOperation)
    );
}

#[tokio::test]
async fn test_starting_session_during_write_fails_the_pairing_run() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.search_item("A1").await.unwrap();
    let request = handle.start_pairing().await.unwrap();
    handle.start_session(None).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::ProcessFailed);
    assert_eq!(snapshot.coordinator.device_operation, None);
    assert_eq!(
        station.reader.commands(),
        vec![
            HardwareCommand::WriteTag(request.clone()),
            HardwareCommand::StopOperation,
        ]
    );

    let entry = db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.pairing_status, PairingStatus::WriteFailed);
    assert!(entry.rfid_tag_hex.is_none());

    // The cut-off write answering late changes nothing
    station
        .callbacks
        .on_write_result(true, Some(request.new_epc_hex.clone()), None);
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::ProcessFailed);

    // The workflow is usable again
    let state = handle.search_item("A1").await.unwrap();
    assert_eq!(state, TaggingState::BookFoundUntagged);
}

#[tokio::test]
async fn test_clearing_scan_during_tid_read_fails_the_pairing_run() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.search_item("A1").await.unwrap();
    let request = handle.start_pairing().await.unwrap();
    station
        .callbacks
        .on_write_result(true, Some(request.new_epc_hex.clone()), None);
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::ReadingTid);

    handle.clear_scan().await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::ProcessFailed);
    assert_eq!(snapshot.coordinator.device_operation, None);
    assert!(snapshot.last_error.unwrap().contains("cancelled"));

    let entry = db.catalog().find_by_item_code("A1").await.unwrap().unwrap();
    assert_eq!(entry.pairing_status, PairingStatus::PairingFailed);
    assert!(entry.tid.is_none());
}

#[tokio::test]
async fn test_pairing_search_by_barcode_scan() {
    let db = library_db().await;
    let station = start_station(&test_config(), db.clone());
    let handle = &station.handle;

    handle.select_mode(false).await.unwrap();
    handle.toggle_scan(ScanPurpose::PairingSearch).await.unwrap();
    station.callbacks.on_barcode_scanned("B002");

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.pairing.state, TaggingState::BookFoundAlreadyTagged);
    assert_eq!(snapshot.pairing.item_code.as_deref(), Some("B002"));
    // A pairing search never touches the stock-take session
    assert!(snapshot.session.is_none());
}

// =============================================================================
// Lock & Lifecycle
// =============================================================================

#[tokio::test]
async fn test_lock_tag_reports_result() {
    let station = start_station(&test_config(), Arc::new(EmptyStore));
    let handle = &station.handle;

    handle
        .lock_tag("413100000000000000000000", MemoryBank::Epc, LockAction::Lock)
        .await
        .unwrap();
    assert!(matches!(
        station.reader.commands().as_slice(),
        [HardwareCommand::LockTag(request)]
            if request.target_epc == "413100000000000000000000"
                && request.access_password == "00000000"
    ));

    station.callbacks.on_lock_result(true, None);
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status_message, "Tag locked");
    assert_eq!(snapshot.coordinator.device_operation, None);

    // Malformed EPCs never reach the reader
    let err = handle
        .lock_tag("XYZ", MemoryBank::Epc, LockAction::Lock)
        .await
        .unwrap_err();
    assert!(err.is_validation_error());
    assert_eq!(station.reader.commands().len(), 1);
}

#[tokio::test]
async fn test_device_error_while_idle_is_reported() {
    let station = start_station(&test_config(), Arc::new(EmptyStore));

    station.callbacks.on_device_error("antenna disconnected");
    let snapshot = station.handle.snapshot().await.unwrap();
    assert!(snapshot.last_error.unwrap().contains("antenna disconnected"));
}

#[tokio::test]
async fn test_handle_fails_after_shutdown() {
    let station = start_station(&test_config(), Arc::new(EmptyStore));

    station.handle.shutdown().await.unwrap();
    let err = station.handle.snapshot().await.unwrap_err();
    assert!(matches!(err, ScanError::ChannelError(_)));
}

#[tokio::test]
async fn test_subscribers_see_published_snapshots() {
    let station = start_station(&test_config(), Arc::new(EmptyStore));
    let mut updates = station.handle.subscribe();

    station
        .handle
        .start_session(Some("Stacks".to_string()))
        .await
        .unwrap();

    let published = updates
        .wait_for(|s| s.session.is_some())
        .await
        .unwrap()
        .clone();
    let session = published.session.unwrap();
    assert_eq!(session.location.as_deref(), Some("Stacks"));
    assert_eq!(published.device_id, "handheld-test");
    assert!(station.handle.latest().session.is_some());
}
