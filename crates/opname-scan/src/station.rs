//! # Scan Station
//!
//! The single owner of one reader. Reader events, read deadlines and UI
//! commands are all handled on one task, in arrival order.
//!
//! ## Actor Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ScanStation task                               │
//! │                                                                         │
//! │   ScanEvent (mpsc, unbounded) ──┐                                       │
//! │   read deadline (sleep_until) ──┼──► select! (biased, in this order)    │
//! │   StationCommand (mpsc)       ──┘          │                            │
//! │                                            ▼                            │
//! │                              ScanModeCoordinator                        │
//! │                               │ Resolved / Device outcome               │
//! │                 ┌─────────────┴─────────────┐                           │
//! │                 ▼                           ▼                           │
//! │           StockTakeFlow             TagPairingWorkflow                  │
//! │                 └─────────────┬─────────────┘                           │
//! │                               ▼                                         │
//! │                  CatalogStore (opname-db)                               │
//! │                                                                         │
//! │   After every step: StationSnapshot ──► watch channel ──► UI            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reader events win over commands so a result that has already arrived is
//! applied before a command that was issued after it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use ts_rs::TS;

use opname_core::pairing::{PairingSnapshot, TaggingState, WriteTagRequest};
use opname_core::reconciliation::{FilterCriteria, SessionItem, SessionSnapshot};
use opname_core::validation::{normalize_epc, validate_epc_hex};
use opname_core::SessionReport;

use crate::config::StationConfig;
use crate::coordinator::{
    CoordinatorSnapshot, DeviceOperation, DeviceOutcome, ResolvedScan, ScanModeCoordinator,
    ScanOutcome, ScanPurpose, ToggleOutcome,
};
use crate::error::{ScanError, ScanResult};
use crate::event::ScanEvent;
use crate::hardware::{HardwareFacade, LockAction, LockTagRequest, MemoryBank};
use crate::pairing::TagPairingWorkflow;
use crate::stocktake::StockTakeFlow;
use crate::store::CatalogStore;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// Snapshot
// =============================================================================

/// Everything a UI needs to render the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StationSnapshot {
    pub device_id: String,
    pub coordinator: CoordinatorSnapshot,
    pub session: Option<SessionSnapshot>,
    pub pairing: PairingSnapshot,
    /// Outcome of the last successful step.
    pub status_message: String,
    /// Description of the last failure, cleared by the next success.
    pub last_error: Option<String>,
}

// =============================================================================
// Commands & Handle
// =============================================================================

#[derive(Debug)]
enum StationCommand {
    SelectMode {
        uhf: bool,
        reply: oneshot::Sender<CoordinatorSnapshot>,
    },
    ToggleScan {
        purpose: ScanPurpose,
        reply: oneshot::Sender<ScanResult<ToggleOutcome>>,
    },
    ClearScan {
        reply: oneshot::Sender<()>,
    },
    StartSession {
        resume: bool,
        location: Option<String>,
        reply: oneshot::Sender<ScanResult<SessionSnapshot>>,
    },
    SetLocation {
        location: Option<String>,
        reply: oneshot::Sender<ScanResult<()>>,
    },
    SetFilter {
        criteria: FilterCriteria,
        reply: oneshot::Sender<ScanResult<()>>,
    },
    FilteredItems {
        reply: oneshot::Sender<ScanResult<Vec<SessionItem>>>,
    },
    Finalize {
        name: String,
        reply: oneshot::Sender<ScanResult<SessionReport>>,
    },
    SearchItem {
        item_code: String,
        reply: oneshot::Sender<ScanResult<TaggingState>>,
    },
    StartPairing {
        reply: oneshot::Sender<ScanResult<WriteTagRequest>>,
    },
    ResetPairing {
        reply: oneshot::Sender<()>,
    },
    LockTag {
        target_epc: String,
        bank: MemoryBank,
        action: LockAction,
        reply: oneshot::Sender<ScanResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<StationSnapshot>,
    },
    Shutdown,
}

/// Handle for driving a running [`ScanStation`].
#[derive(Clone)]
pub struct StationHandle {
    cmd_tx: mpsc::Sender<StationCommand>,
    snapshot_rx: watch::Receiver<StationSnapshot>,
}

impl StationHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> StationCommand,
    ) -> ScanResult<T> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(reply))
            .await
            .map_err(|_| ScanError::ChannelError("Station channel closed".into()))?;
        rx.await
            .map_err(|_| ScanError::ChannelError("Station reply channel closed".into()))
    }

    /// Selects UHF (`true`) or barcode (`false`), stopping the other
    /// modality if it is scanning.
    pub async fn select_mode(&self, uhf: bool) -> ScanResult<CoordinatorSnapshot> {
        self.request(|reply| StationCommand::SelectMode { uhf, reply })
            .await
    }

    /// Starts or stops a scan with the selected modality.
    pub async fn toggle_scan(&self, purpose: ScanPurpose) -> ScanResult<ToggleOutcome> {
        self.request(|reply| StationCommand::ToggleScan { purpose, reply })
            .await?
    }

    /// Stops any active scan.
    pub async fn clear_scan(&self) -> ScanResult<()> {
        self.request(|reply| StationCommand::ClearScan { reply }).await
    }

    /// Starts a fresh stock-take session over the whole catalog.
    pub async fn start_session(&self, location: Option<String>) -> ScanResult<SessionSnapshot> {
        self.request(|reply| StationCommand::StartSession {
            resume: false,
            location,
            reply,
        })
        .await?
    }

    /// Rebuilds the session from persisted sightings.
    pub async fn resume_session(&self, location: Option<String>) -> ScanResult<SessionSnapshot> {
        self.request(|reply| StationCommand::StartSession {
            resume: true,
            location,
            reply,
        })
        .await?
    }

    pub async fn set_location(&self, location: Option<String>) -> ScanResult<()> {
        self.request(|reply| StationCommand::SetLocation { location, reply })
            .await?
    }

    pub async fn set_filter(&self, criteria: FilterCriteria) -> ScanResult<()> {
        self.request(|reply| StationCommand::SetFilter { criteria, reply })
            .await?
    }

    /// The session items matching the current filter, in display order.
    pub async fn filtered_items(&self) -> ScanResult<Vec<SessionItem>> {
        self.request(|reply| StationCommand::FilteredItems { reply })
            .await?
    }

    /// Saves the session as a named report and closes it.
    pub async fn finalize_session(&self, name: impl Into<String>) -> ScanResult<SessionReport> {
        let name = name.into();
        self.request(|reply| StationCommand::Finalize { name, reply })
            .await?
    }

    /// Looks up the catalog entry to pair.
    pub async fn search_item(&self, item_code: impl Into<String>) -> ScanResult<TaggingState> {
        let item_code = item_code.into();
        self.request(|reply| StationCommand::SearchItem { item_code, reply })
            .await?
    }

    /// Writes the target EPC to the tag on the reader. The rest of the run
    /// proceeds as reader events arrive; follow it through [`Self::subscribe`].
    pub async fn start_pairing(&self) -> ScanResult<WriteTagRequest> {
        self.request(|reply| StationCommand::StartPairing { reply })
            .await?
    }

    pub async fn reset_pairing(&self) -> ScanResult<()> {
        self.request(|reply| StationCommand::ResetPairing { reply })
            .await
    }

    /// Locks (or unlocks) a memory bank of the tag with `target_epc`.
    pub async fn lock_tag(
        &self,
        target_epc: impl Into<String>,
        bank: MemoryBank,
        action: LockAction,
    ) -> ScanResult<()> {
        let target_epc = target_epc.into();
        self.request(|reply| StationCommand::LockTag {
            target_epc,
            bank,
            action,
            reply,
        })
        .await?
    }

    /// Returns the current snapshot, after every queued command has run.
    pub async fn snapshot(&self) -> ScanResult<StationSnapshot> {
        self.request(|reply| StationCommand::Snapshot { reply })
            .await
    }

    /// Returns the last published snapshot without a round trip.
    pub fn latest(&self) -> StationSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<StationSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stops any scan and ends the station task.
    pub async fn shutdown(&self) -> ScanResult<()> {
        self.cmd_tx
            .send(StationCommand::Shutdown)
            .await
            .map_err(|_| ScanError::ChannelError("Station channel closed".into()))
    }
}

// =============================================================================
// Station
// =============================================================================

/// Owns the coordinator and both workflows for one reader.
pub struct ScanStation {
    device_id: String,
    coordinator: ScanModeCoordinator,
    pairing: TagPairingWorkflow,
    stocktake: StockTakeFlow,
    store: Arc<dyn CatalogStore>,
    default_location: Option<String>,
    access_password: String,
    status_message: String,
    last_error: Option<String>,
    snapshot_tx: watch::Sender<StationSnapshot>,
}

impl ScanStation {
    pub fn new(
        config: &StationConfig,
        facade: Arc<dyn HardwareFacade>,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        let coordinator = ScanModeCoordinator::new(facade, config.reader.default_mode)
            .with_read_timeout(config.reader.single_read_timeout())
            .with_continuous_inventory(config.reader.continuous_inventory);
        let pairing = TagPairingWorkflow::new(
            config.reader.access_password.clone(),
            config.reader.verify_written_epc,
        );
        let stocktake = StockTakeFlow::new(config.session.persist_sightings);

        let status_message = "Ready".to_string();
        let initial = StationSnapshot {
            device_id: config.device.id.clone(),
            coordinator: coordinator.snapshot(),
            session: None,
            pairing: pairing.snapshot(),
            status_message: status_message.clone(),
            last_error: None,
        };
        let (snapshot_tx, _) = watch::channel(initial);

        ScanStation {
            device_id: config.device.id.clone(),
            coordinator,
            pairing,
            stocktake,
            store,
            default_location: config.session.location.clone(),
            access_password: config.reader.access_password.clone(),
            status_message,
            last_error: None,
            snapshot_tx,
        }
    }

    /// Starts the station task on the current runtime and returns a handle.
    pub fn start(self, events: mpsc::UnboundedReceiver<ScanEvent>) -> StationHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = StationHandle {
            cmd_tx,
            snapshot_rx: self.snapshot_tx.subscribe(),
        };

        tokio::spawn(async move {
            self.run(cmd_rx, events).await;
        });

        handle
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<StationCommand>,
        mut events: mpsc::UnboundedReceiver<ScanEvent>,
    ) {
        info!(
            device_id = %self.device_id,
            mode = %self.coordinator.selected_mode(),
            "Scan station started"
        );

        loop {
            let deadline = self.coordinator.next_deadline();

            tokio::select! {
                biased;

                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handle_deadline().await;
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(StationCommand::Shutdown) | None => {
                            info!("Scan station shutting down");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
            }

            self.publish();
        }

        self.clear_reader("station shut down").await;
        self.publish();
    }

    // =========================================================================
    // Reader Events
    // =========================================================================

    async fn handle_event(&mut self, event: ScanEvent) {
        debug!(kind = event.kind(), "Reader event");
        let outcome = self.coordinator.on_scan_event(event);
        self.handle_outcome(outcome).await;
    }

    /// Stops the reader. A cut-off device operation is ended as failed so
    /// the pairing run does not wait for a result that never comes.
    async fn clear_reader(&mut self, reason: &str) {
        if let Some(operation) = self.coordinator.clear() {
            self.handle_outcome(ScanOutcome::Device(DeviceOutcome::Failed {
                operation,
                reason: format!("cancelled: {}", reason),
            }))
            .await;
        }
    }

    async fn handle_deadline(&mut self) {
        if let Some(outcome) = self.coordinator.check_timeout(Instant::now()) {
            self.handle_outcome(outcome).await;
        }
    }

    async fn handle_outcome(&mut self, outcome: ScanOutcome) {
        match outcome {
            ScanOutcome::Resolved(scan) => self.handle_resolved(scan).await,
            ScanOutcome::ScanFailed { method, reason, .. } => {
                self.fail(format!("{} scan failed: {}", method, reason));
            }
            ScanOutcome::TimedOut { after_secs, .. } => {
                self.fail(ScanError::Timeout(after_secs).to_string());
            }
            ScanOutcome::Stopped { method } => {
                self.succeed(format!("{} scan stopped", method));
            }
            ScanOutcome::Device(DeviceOutcome::LockCompleted { success, error }) => {
                if success {
                    self.succeed("Tag locked".to_string());
                } else {
                    let reason = error.unwrap_or_else(|| "unknown error".to_string());
                    self.fail(format!("Lock failed: {}", reason));
                }
            }
            ScanOutcome::Device(DeviceOutcome::Failed {
                operation: DeviceOperation::Lock,
                reason,
            }) => {
                self.fail(format!("Lock failed: {}", reason));
            }
            ScanOutcome::Device(outcome) => {
                let result = self
                    .pairing
                    .on_device_outcome(
                        outcome,
                        &mut self.coordinator,
                        self.store.as_ref(),
                        Instant::now(),
                    )
                    .await;
                match result {
                    Ok(_) => self.report_pairing(),
                    Err(e) => self.fail(e.to_string()),
                }
            }
            ScanOutcome::Fault { message } => {
                self.fail(format!("Device error: {}", message));
            }
            ScanOutcome::Ignored => {}
        }
    }

    async fn handle_resolved(&mut self, scan: ResolvedScan) {
        match scan.purpose {
            ScanPurpose::StockTake => {
                let result = self
                    .stocktake
                    .resolve(&scan.identifier, scan.method, self.store.as_ref())
                    .await;
                match result {
                    Ok(resolution) => self.succeed(resolution.message()),
                    Err(e) => self.fail(e.to_string()),
                }
            }
            ScanPurpose::PairingSearch => {
                match self.pairing.search_by_scan(&scan, self.store.as_ref()).await {
                    Ok(_) => self.report_pairing(),
                    Err(e) => self.fail(e.to_string()),
                }
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_command(&mut self, cmd: StationCommand) {
        match cmd {
            StationCommand::SelectMode { uhf, reply } => {
                self.coordinator.select_mode(uhf);
                let _ = reply.send(self.coordinator.snapshot());
            }
            StationCommand::ToggleScan { purpose, reply } => {
                let result = self.coordinator.toggle_scan(purpose, Instant::now());
                match &result {
                    Ok(ToggleOutcome::Started(operation)) => {
                        self.succeed(format!("Scanning ({:?})", operation));
                    }
                    Ok(ToggleOutcome::Stopped) => self.succeed("Scan stopped".to_string()),
                    Err(e) => self.fail(e.to_string()),
                }
                let _ = reply.send(result);
            }
            StationCommand::ClearScan { reply } => {
                self.clear_reader("scan cleared").await;
                let _ = reply.send(());
            }
            StationCommand::StartSession {
                resume,
                location,
                reply,
            } => {
                self.clear_reader("session started").await;
                let location = location.or_else(|| self.default_location.clone());
                let store = self.store.as_ref();
                let result = if resume {
                    self.stocktake.resume(store, location).await
                } else {
                    self.stocktake.start(store, location).await
                };
                self.record(&result, |s| {
                    format!("Session started: {} items expected", s.counts.expected)
                });
                let _ = reply.send(result);
            }
            StationCommand::SetLocation { location, reply } => {
                let result = self.stocktake.set_location(location);
                let _ = reply.send(result);
            }
            StationCommand::SetFilter { criteria, reply } => {
                let result = self.stocktake.set_filter(criteria);
                let _ = reply.send(result);
            }
            StationCommand::FilteredItems { reply } => {
                let _ = reply.send(self.stocktake.filtered_items());
            }
            StationCommand::Finalize { name, reply } => {
                self.clear_reader("session finalized").await;
                let result = self.stocktake.finalize(&name, self.store.as_ref()).await;
                self.record(&result, |r| {
                    format!(
                        "Report '{}' saved: {} found, {} missing, {} new",
                        r.name, r.found_count, r.missing_count, r.new_count
                    )
                });
                let _ = reply.send(result);
            }
            StationCommand::SearchItem { item_code, reply } => {
                let result = self
                    .pairing
                    .search_by_item_code(&item_code, self.store.as_ref())
                    .await;
                match &result {
                    Ok(_) => self.report_pairing(),
                    Err(e) => self.fail(e.to_string()),
                }
                let _ = reply.send(result);
            }
            StationCommand::StartPairing { reply } => {
                let result = self
                    .pairing
                    .start_pairing(&mut self.coordinator, self.store.as_ref())
                    .await;
                match &result {
                    Ok(_) => self.report_pairing(),
                    Err(e) => self.fail(e.to_string()),
                }
                let _ = reply.send(result);
            }
            StationCommand::ResetPairing { reply } => {
                self.pairing.reset(&mut self.coordinator);
                self.succeed("Pairing reset".to_string());
                let _ = reply.send(());
            }
            StationCommand::LockTag {
                target_epc,
                bank,
                action,
                reply,
            } => {
                let result = self.lock_tag(&target_epc, bank, action);
                match &result {
                    Ok(()) => self.succeed(format!("Lock requested ({} {})", action, bank)),
                    Err(e) => self.fail(e.to_string()),
                }
                let _ = reply.send(result);
            }
            StationCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            StationCommand::Shutdown => {}
        }
    }

    fn lock_tag(&mut self, target_epc: &str, bank: MemoryBank, action: LockAction) -> ScanResult<()> {
        let target_epc = normalize_epc(target_epc);
        validate_epc_hex(&target_epc)?;

        let request = LockTagRequest {
            target_epc,
            access_password: self.access_password.clone(),
            bank,
            action,
        };
        self.coordinator.lock_tag(&request)
    }

    // =========================================================================
    // Status & Snapshot
    // =========================================================================

    fn succeed(&mut self, message: String) {
        debug!(%message, "Station status");
        self.status_message = message;
        self.last_error = None;
    }

    fn fail(&mut self, message: String) {
        warn!(error = %message, "Station operation failed");
        self.last_error = Some(message);
    }

    fn record<T>(&mut self, result: &ScanResult<T>, describe: impl FnOnce(&T) -> String) {
        match result {
            Ok(value) => self.succeed(describe(value)),
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn report_pairing(&mut self) {
        let message = self.pairing.machine().message().to_string();
        if self.pairing.state() == TaggingState::ProcessFailed {
            self.fail(message);
        } else {
            self.succeed(message);
        }
    }

    fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            device_id: self.device_id.clone(),
            coordinator: self.coordinator.snapshot(),
            session: self.stocktake.engine().snapshot(),
            pairing: self.pairing.snapshot(),
            status_message: self.status_message.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}
