//! # Catalog Store Contract
//!
//! What the workflows need from persistence. [`opname_db::Database`] is the
//! production implementation; tests substitute their own.
//!
//! Every method is one atomic write or one read. Pairing writes touch only
//! pairing fields and sighting writes only opname fields, so the two
//! workflows never overwrite each other's columns.

use async_trait::async_trait;

use opname_core::{CatalogEntry, PairingRecord, SessionReport, Sighting};
use opname_db::Database;

use crate::error::ScanResult;

/// Persistence used by the stock-take flow and the pairing workflow.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_catalog(&self) -> ScanResult<Vec<CatalogEntry>>;

    async fn find_by_item_code(&self, item_code: &str) -> ScanResult<Option<CatalogEntry>>;

    async fn find_by_rfid_tag(&self, epc: &str) -> ScanResult<Option<CatalogEntry>>;

    /// Writes the pairing fields of one entry.
    async fn update_pairing(&self, record: &PairingRecord) -> ScanResult<()>;

    /// Writes the opname fields of a first sighting.
    async fn record_sighting(&self, sighting: &Sighting) -> ScanResult<()>;

    /// Clears the opname fields of every entry. Returns the rows touched.
    async fn reset_opname(&self) -> ScanResult<u64>;

    /// Saves a report and its items atomically. Returns the report id.
    async fn save_session_report(&self, report: &SessionReport) -> ScanResult<String>;
}

#[async_trait]
impl CatalogStore for Database {
    async fn load_catalog(&self) -> ScanResult<Vec<CatalogEntry>> {
        Ok(self.catalog().load_catalog().await?)
    }

    async fn find_by_item_code(&self, item_code: &str) -> ScanResult<Option<CatalogEntry>> {
        Ok(self.catalog().find_by_item_code(item_code).await?)
    }

    async fn find_by_rfid_tag(&self, epc: &str) -> ScanResult<Option<CatalogEntry>> {
        Ok(self.catalog().find_by_rfid_tag(epc).await?)
    }

    async fn update_pairing(&self, record: &PairingRecord) -> ScanResult<()> {
        Ok(self.catalog().update_pairing(record).await?)
    }

    async fn record_sighting(&self, sighting: &Sighting) -> ScanResult<()> {
        Ok(self.catalog().record_sighting(sighting).await?)
    }

    async fn reset_opname(&self) -> ScanResult<u64> {
        Ok(self.catalog().reset_opname().await?)
    }

    async fn save_session_report(&self, report: &SessionReport) -> ScanResult<String> {
        Ok(self.reports().save_session_report(report).await?)
    }
}
