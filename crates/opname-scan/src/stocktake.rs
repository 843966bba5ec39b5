//! # Stock-Take Flow
//!
//! Connects the [`ReconciliationEngine`] to the catalog store.
//!
//! ## Write Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve(id)                                                            │
//! │    1. engine.pending_sighting(id)      (read only)                      │
//! │    2. store.record_sighting(..)        (persist_sightings only)         │
//! │    3. engine.resolve_scan(id)          (session changes here)           │
//! │                                                                         │
//! │  finalize(name)                                                         │
//! │    1. engine.build_report(name)        (read only)                      │
//! │    2. store.save_session_report(..)    (one transaction)                │
//! │    3. engine.close_session()                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed write returns before the in-memory step, so the operator can
//! retry without re-scanning.

use chrono::Utc;
use tracing::{debug, info, warn};

use opname_core::reconciliation::{
    FilterCriteria, ReconciliationEngine, ScanResolution, SessionCounts, SessionItem,
    SessionSnapshot,
};
use opname_core::{CoreError, ScanMethod, SessionReport};

use crate::error::ScanResult;
use crate::store::CatalogStore;

/// The stock-take side of a station.
#[derive(Debug, Default)]
pub struct StockTakeFlow {
    engine: ReconciliationEngine,
    persist_sightings: bool,
}

impl StockTakeFlow {
    /// With `persist_sightings`, every first sighting is written to the
    /// catalog as it happens and a session can be resumed after a restart.
    pub fn new(persist_sightings: bool) -> Self {
        StockTakeFlow {
            engine: ReconciliationEngine::new(),
            persist_sightings,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Starts a fresh session over the whole catalog.
    ///
    /// When sightings are persisted, the catalog's opname fields are cleared
    /// first so the new session begins with everything `NotScanned`.
    pub async fn start(
        &mut self,
        store: &dyn CatalogStore,
        location: Option<String>,
    ) -> ScanResult<SessionSnapshot> {
        if self.persist_sightings {
            let rows = store.reset_opname().await?;
            debug!(rows, "Persisted sightings cleared");
        }

        let catalog = store.load_catalog().await?;
        let session = self.engine.start_session(catalog, Utc::now());
        info!(
            session_id = %session.session_id(),
            expected = session.counts().expected,
            "Stock-take session started"
        );
        if !session.duplicate_item_codes().is_empty() {
            warn!(
                item_codes = ?session.duplicate_item_codes(),
                "Duplicate catalog item codes skipped"
            );
        }

        self.engine.set_location(location)?;
        self.snapshot()
    }

    /// Rebuilds a session from the sightings already on record.
    pub async fn resume(
        &mut self,
        store: &dyn CatalogStore,
        location: Option<String>,
    ) -> ScanResult<SessionSnapshot> {
        let catalog = store.load_catalog().await?;
        let session = self.engine.resume_session(catalog, Utc::now());
        info!(
            session_id = %session.session_id(),
            expected = session.counts().expected,
            found = session.counts().found,
            "Stock-take session resumed"
        );
        if !session.duplicate_item_codes().is_empty() {
            warn!(
                item_codes = ?session.duplicate_item_codes(),
                "Duplicate catalog item codes skipped"
            );
        }

        self.engine.set_location(location)?;
        self.snapshot()
    }

    /// Resolves one scanned identifier.
    pub async fn resolve(
        &mut self,
        identifier: &str,
        method: ScanMethod,
        store: &dyn CatalogStore,
    ) -> ScanResult<ScanResolution> {
        let now = Utc::now();

        if self.persist_sightings {
            if let Some(sighting) = self.engine.pending_sighting(identifier, method, now)? {
                store.record_sighting(&sighting).await?;
            }
        }

        let resolution = self.engine.resolve_scan(identifier, method, now)?;
        match &resolution {
            ScanResolution::Found { key, .. } => debug!(%key, %method, "Item found"),
            ScanResolution::AlreadyFound { key, .. } => {
                info!(%key, %method, "Duplicate scan ignored")
            }
            ScanResolution::Unexpected {
                identifier,
                first_sighting,
                ..
            } => info!(%identifier, %method, first_sighting, "Identifier not in catalog"),
        }
        Ok(resolution)
    }

    pub fn set_location(&mut self, location: Option<String>) -> ScanResult<()> {
        Ok(self.engine.set_location(location)?)
    }

    pub fn set_filter(&mut self, criteria: FilterCriteria) -> ScanResult<()> {
        Ok(self.engine.set_filter(criteria)?)
    }

    pub fn counts(&self) -> ScanResult<SessionCounts> {
        Ok(self.engine.counts()?)
    }

    pub fn filtered_items(&self) -> ScanResult<Vec<SessionItem>> {
        Ok(self.engine.filtered_items()?)
    }

    pub fn snapshot(&self) -> ScanResult<SessionSnapshot> {
        self.engine
            .snapshot()
            .ok_or_else(|| CoreError::NoActiveSession.into())
    }

    /// Saves the session as a named report and closes it.
    ///
    /// If the save fails the session stays open and unchanged.
    pub async fn finalize(
        &mut self,
        name: &str,
        store: &dyn CatalogStore,
    ) -> ScanResult<SessionReport> {
        let report = self.engine.build_report(name, Utc::now())?;
        let report_id = store.save_session_report(&report).await?;
        self.engine.close_session()?;

        info!(
            %report_id,
            found = report.found_count,
            missing = report.missing_count,
            new = report.new_count,
            "Stock-take session finalized"
        );
        Ok(report)
    }
}
