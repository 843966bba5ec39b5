//! # Session Report Repository
//!
//! Persists finalized stock-take sessions.
//!
//! ## Atomic Save
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    INSERT session_reports        (header + counts)                      │
//! │    INSERT session_report_items   (one row per item)                     │
//! │    UPDATE catalog_entries        (final opname fields, catalog items)   │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure rolls back everything: no half-written report, and the    │
//! │  catalog keeps its pre-save state so the save can simply be retried.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use opname_core::{SessionReport, SessionReportItem};

/// Repository for session reports.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    /// Creates a new ReportRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Saves a report with all its items in one transaction.
    ///
    /// Returns the report id.
    pub async fn save_session_report(&self, report: &SessionReport) -> DbResult<String> {
        info!(
            report_id = %report.id,
            name = %report.name,
            items = report.items.len(),
            "Saving session report"
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO session_reports (
                id, name, session_id, started_at, finished_at,
                expected_count, found_count, missing_count, new_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&report.id)
        .bind(&report.name)
        .bind(&report.session_id)
        .bind(report.started_at)
        .bind(report.finished_at)
        .bind(report.expected_count)
        .bind(report.found_count)
        .bind(report.missing_count)
        .bind(report.new_count)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::from(e).with_value(report.id.clone()))?;

        for item in &report.items {
            sqlx::query(
                r#"
                INSERT INTO session_report_items (
                    report_id, item_code, title, expected_location, rfid_tag_hex, status,
                    last_seen_timestamp, scan_method, actual_scanned_location,
                    is_new_or_unexpected, misplaced
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&report.id)
            .bind(&item.item_code)
            .bind(&item.title)
            .bind(&item.expected_location)
            .bind(&item.rfid_tag_hex)
            .bind(item.status)
            .bind(item.last_seen_timestamp)
            .bind(item.scan_method)
            .bind(&item.actual_scanned_location)
            .bind(item.is_new_or_unexpected)
            .bind(item.misplaced)
            .execute(&mut *tx)
            .await?;

            // Unexpected items have no catalog row to update.
            let item_code = match (&item.item_code, item.is_new_or_unexpected) {
                (Some(code), false) => code,
                _ => continue,
            };

            sqlx::query(
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
            .bind(item_code)
            .bind(item.status)
            .bind(item.last_seen_timestamp)
            .bind(item.scan_method)
            .bind(&item.actual_scanned_location)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(report_id = %report.id, "Session report saved");
        Ok(report.id.clone())
    }

    /// Lists report headers, newest first. `items` is left empty.
    pub async fn list_reports(&self, limit: u32) -> DbResult<Vec<SessionReport>> {
        let reports = sqlx::query_as::<_, SessionReport>(
            r#"
            SELECT id, name, session_id, started_at, finished_at,
                   expected_count, found_count, missing_count, new_count
            FROM session_reports
            ORDER BY finished_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = reports.len(), "Reports listed");
        Ok(reports)
    }

    /// Gets a report with its items.
    pub async fn get_report(&self, report_id: &str) -> DbResult<Option<SessionReport>> {
        let report = sqlx::query_as::<_, SessionReport>(
            r#"
            SELECT id, name, session_id, started_at, finished_at,
                   expected_count, found_count, missing_count, new_count
            FROM session_reports
            WHERE id = ?1
            "#,
        )
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;

        match report {
            Some(mut report) => {
                report.items = self.get_items(report_id).await?;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    /// Gets the detail rows of a report, in insertion order.
    pub async fn get_items(&self, report_id: &str) -> DbResult<Vec<SessionReportItem>> {
        let items = sqlx::query_as::<_, SessionReportItem>(
            r#"
            SELECT item_code, title, expected_location, rfid_tag_hex, status,
                   last_seen_timestamp, scan_method, actual_scanned_location,
                   is_new_or_unexpected, misplaced
            FROM session_report_items
            WHERE report_id = ?1
            ORDER BY id
            "#,
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}
