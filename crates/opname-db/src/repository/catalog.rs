//! # Catalog Repository
//!
//! Database operations for catalog entries.
//!
//! ## Field Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  catalog_entries                                                        │
//! │                                                                         │
//! │  item_code, title, location_name   ← insert (catalog import / seed)     │
//! │  rfid_tag_hex, tid, pairing_*      ← update_pairing (pairing workflow)  │
//! │  opname_status, last_seen_*,                                            │
//! │  actual_scanned_location,                                               │
//! │  last_scan_method                  ← record_sighting / reset_opname /   │
//! │                                      report save (stock-take flow)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each update is a single statement, so the two workflows never interleave
//! partial writes on the same row.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use opname_core::validation::normalize_epc;
use opname_core::{CatalogEntry, PairingRecord, PairingStatus, Sighting};

/// `SELECT <all catalog columns> FROM catalog_entries <tail>`
macro_rules! select_catalog {
    ($tail:literal) => {
        concat!(
            "SELECT item_code, title, location_name, rfid_tag_hex, tid, ",
            "pairing_status, pairing_timestamp, opname_status, last_seen_timestamp, ",
            "actual_scanned_location, last_scan_method, is_new_or_unexpected, ",
            "created_at, updated_at FROM catalog_entries ",
            $tail
        )
    };
}

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Loads the whole catalog, ordered by item code.
    pub async fn load_catalog(&self) -> DbResult<Vec<CatalogEntry>> {
        let entries = sqlx::query_as::<_, CatalogEntry>(select_catalog!("ORDER BY item_code"))
            .fetch_all(&self.pool)
            .await?;

        debug!(count = entries.len(), "Catalog loaded");
        Ok(entries)
    }

    /// Gets an entry by its item code.
    pub async fn find_by_item_code(&self, item_code: &str) -> DbResult<Option<CatalogEntry>> {
        let entry = sqlx::query_as::<_, CatalogEntry>(select_catalog!("WHERE item_code = ?1"))
            .bind(item_code.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// Gets the entry paired to an EPC (case-insensitive).
    pub async fn find_by_rfid_tag(&self, epc: &str) -> DbResult<Option<CatalogEntry>> {
        let entry = sqlx::query_as::<_, CatalogEntry>(select_catalog!("WHERE rfid_tag_hex = ?1"))
            .bind(normalize_epc(epc))
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// Inserts a new catalog entry.
    ///
    /// ## Errors
    /// - `UniqueViolation` for a duplicate item code or EPC
    pub async fn insert(&self, entry: &CatalogEntry) -> DbResult<()> {
        debug!(item_code = %entry.item_code, "Inserting catalog entry");

        let rfid = entry.rfid_tag_hex.as_deref().map(normalize_epc);

        sqlx::query(
            r#"
            INSERT INTO catalog_entries (
                item_code, title, location_name, rfid_tag_hex, tid,
                pairing_status, pairing_timestamp, opname_status, last_seen_timestamp,
                actual_scanned_location, last_scan_method, is_new_or_unexpected,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(entry.item_code.trim())
        .bind(entry.title.trim())
        .bind(entry.location_name.trim())
        .bind(&rfid)
        .bind(&entry.tid)
        .bind(entry.pairing_status)
        .bind(entry.pairing_timestamp)
        .bind(entry.opname_status)
        .bind(entry.last_seen_timestamp)
        .bind(&entry.actual_scanned_location)
        .bind(entry.last_scan_method)
        .bind(entry.is_new_or_unexpected)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let value = if is_unique_violation_on(&e, "rfid_tag_hex") {
                rfid.clone().unwrap_or_default()
            } else {
                entry.item_code.clone()
            };
            DbError::from(e).with_value(value)
        })?;

        Ok(())
    }

    /// Writes the pairing fields of one entry in a single statement.
    ///
    /// `rfid_tag_hex` and `tid` are only overwritten when the record carries
    /// them, so recording a failure keeps whatever tag was paired before.
    /// `pairing_timestamp` moves only on success.
    ///
    /// ## Errors
    /// - `NotFound` if no entry has the item code
    /// - `UniqueViolation` if another entry already carries the EPC
    pub async fn update_pairing(&self, record: &PairingRecord) -> DbResult<()> {
        info!(
            item_code = %record.item_code,
            status = ?record.status,
            "Updating pairing"
        );

        let rfid = record.rfid_tag_hex.as_deref().map(normalize_epc);
        let success = record.status == PairingStatus::WriteSuccess;

        let result = sqlx::query(
            r#"
            UPDATE catalog_entries SET
                rfid_tag_hex = COALESCE(?2, rfid_tag_hex),
                tid = COALESCE(?3, tid),
                pairing_status = ?4,
                pairing_timestamp = CASE WHEN ?5 THEN ?6 ELSE pairing_timestamp END,
                updated_at = ?7
            WHERE item_code = ?1
            "#,
        )
        .bind(&record.item_code)
        .bind(&rfid)
        .bind(&record.tid)
        .bind(record.status)
        .bind(success)
        .bind(record.timestamp)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_value(rfid.clone().unwrap_or_default()))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CatalogEntry", &record.item_code));
        }
        Ok(())
    }

    /// Writes the opname fields of a first sighting.
    pub async fn record_sighting(&self, sighting: &Sighting) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_entries SET
                opname_status = ?2,
                last_seen_timestamp = ?3,
                last_scan_method = ?4,
                actual_scanned_location = ?5,
                updated_at = ?6
            WHERE item_code = ?1
            "#,
        )
        .bind(&sighting.item_code)
        .bind(sighting.status)
        .bind(sighting.seen_at)
        .bind(sighting.method)
        .bind(&sighting.location)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CatalogEntry", &sighting.item_code));
        }
        debug!(item_code = %sighting.item_code, "Sighting recorded");
        Ok(())
    }

    /// Clears the opname fields of every entry. Returns the rows touched.
    pub async fn reset_opname(&self) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_entries SET
                opname_status = 'not_scanned',
                last_seen_timestamp = NULL,
                last_scan_method = NULL,
                actual_scanned_location = NULL,
                updated_at = ?1
            WHERE opname_status != 'not_scanned'
               OR last_seen_timestamp IS NOT NULL
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(rows = result.rows_affected(), "Opname status reset");
        Ok(result.rows_affected())
    }

    /// Searches title, item code, location and EPC (case-insensitive).
    ///
    /// An empty query lists entries by title.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<CatalogEntry>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching catalog");

        if query.is_empty() {
            let entries = sqlx::query_as::<_, CatalogEntry>(select_catalog!(
                "ORDER BY title COLLATE NOCASE, item_code LIMIT ?1"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            return Ok(entries);
        }

        let pattern = format!("%{}%", query.replace('%', "").replace('_', ""));
        let entries = sqlx::query_as::<_, CatalogEntry>(select_catalog!(
            "WHERE title LIKE ?1 OR item_code LIKE ?1 OR location_name LIKE ?1 \
             OR rfid_tag_hex LIKE ?1 \
             ORDER BY title COLLATE NOCASE, item_code LIMIT ?2"
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = entries.len(), "Search returned entries");
        Ok(entries)
    }

    /// Counts catalog entries.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes every catalog entry. Reports are kept.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM catalog_entries")
            .execute(&self.pool)
            .await?;

        info!(rows = result.rows_affected(), "Catalog cleared");
        Ok(result.rows_affected())
    }
}

/// Whether a raw sqlx error is a unique violation on `column`.
fn is_unique_violation_on(err: &sqlx::Error, column: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message();
            msg.contains("UNIQUE constraint failed") && msg.contains(column)
        }
        _ => false,
    }
}
