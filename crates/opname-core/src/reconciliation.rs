//! # Reconciliation Engine
//!
//! Classifies every catalog entry of one stock-take session against what has
//! actually been scanned, and serves filtered views of the result.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   start_session(catalog) / resume_session(catalog)                      │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   ┌──────────────┐  resolve_scan(id, method)                            │
//! │   │    Open      │──────────────┐                                       │
//! │   │  counts live │◄─────────────┘                                       │
//! │   └──────┬───────┘                                                      │
//! │          │ build_report(name) → store saves atomically                  │
//! │          ▼                                                              │
//! │   ┌──────────────┐                                                      │
//! │   │   Closed     │  resolve_scan → SessionClosed                        │
//! │   └──────┬───────┘                                                      │
//! │          │ start_session(...)                                           │
//! │          ▼                                                              │
//! │        Open (fresh session id)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Counting Rules
//! - `found + missing == expected` after every call. `missing` counts catalog
//!   items that are not `Found`.
//! - `new` counts distinct unexpected identifiers per scan method and never
//!   touches `missing`.
//! - UHF identifiers resolve against EPCs only, barcodes against item codes
//!   only.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{
    CatalogEntry, OpnameStatus, ScanMethod, SessionReport, SessionReportItem, Sighting,
};
use crate::validation::{normalize_epc, normalize_item_code, validate_search_query};

// =============================================================================
// Session Item
// =============================================================================

/// The per-session snapshot of one catalog entry, or a synthesized
/// unexpected sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionItem {
    /// EPC if the entry is tagged, else the item code.
    pub key: String,
    /// `None` for an unknown UHF tag.
    pub item_code: Option<String>,
    pub title: String,
    pub expected_location: Option<String>,
    pub rfid_tag_hex: Option<String>,
    pub status: OpnameStatus,
    #[ts(as = "Option<String>")]
    pub last_seen: Option<DateTime<Utc>>,
    pub scan_method: Option<ScanMethod>,
    pub actual_location: Option<String>,
    pub is_new_or_unexpected: bool,
}

impl SessionItem {
    fn from_entry(entry: &CatalogEntry) -> Self {
        SessionItem {
            key: entry.session_key(),
            item_code: Some(entry.item_code.clone()),
            title: entry.title.clone(),
            expected_location: Some(entry.location_name.clone()).filter(|l| !l.is_empty()),
            rfid_tag_hex: entry
                .rfid_tag_hex
                .as_deref()
                .map(normalize_epc)
                .filter(|e| !e.is_empty()),
            status: OpnameStatus::NotScanned,
            last_seen: None,
            scan_method: None,
            actual_location: None,
            is_new_or_unexpected: false,
        }
    }

    fn unexpected(
        identifier: &str,
        method: ScanMethod,
        seen_at: DateTime<Utc>,
        location: Option<String>,
    ) -> Self {
        let (item_code, rfid_tag_hex, title) = match method {
            ScanMethod::Uhf => (None, Some(identifier.to_string()), "Unknown tag".to_string()),
            ScanMethod::Barcode => (
                Some(identifier.to_string()),
                None,
                "Unknown item".to_string(),
            ),
        };
        SessionItem {
            key: identifier.to_string(),
            item_code,
            title,
            expected_location: None,
            rfid_tag_hex,
            status: OpnameStatus::NewItem,
            last_seen: Some(seen_at),
            scan_method: Some(method),
            actual_location: location,
            is_new_or_unexpected: true,
        }
    }

    /// Seen somewhere other than where the catalog expects it.
    pub fn is_misplaced(&self) -> bool {
        match (&self.expected_location, &self.actual_location) {
            (Some(expected), Some(actual)) => !expected.trim().eq_ignore_ascii_case(actual.trim()),
            _ => false,
        }
    }

    fn matches_text(&self, needle: &str) -> bool {
        let hit = |field: Option<&str>| {
            field
                .map(|value| value.to_lowercase().contains(needle))
                .unwrap_or(false)
        };
        hit(Some(&self.title))
            || hit(self.item_code.as_deref())
            || hit(self.expected_location.as_deref())
            || hit(self.actual_location.as_deref())
            || hit(self.rfid_tag_hex.as_deref())
    }

    fn to_report_item(&self) -> SessionReportItem {
        let status = match self.status {
            OpnameStatus::NotScanned => OpnameStatus::Missing,
            other => other,
        };
        SessionReportItem {
            item_code: self.item_code.clone(),
            title: self.title.clone(),
            expected_location: self.expected_location.clone(),
            rfid_tag_hex: self.rfid_tag_hex.clone(),
            status,
            last_seen_timestamp: self.last_seen,
            scan_method: self.scan_method,
            actual_scanned_location: self.actual_location.clone(),
            is_new_or_unexpected: self.is_new_or_unexpected,
            misplaced: self.is_misplaced(),
        }
    }
}

// =============================================================================
// Counts & Filter
// =============================================================================

/// Aggregate counts of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionCounts {
    pub expected: usize,
    pub found: usize,
    pub missing: usize,
    pub new: usize,
}

impl SessionCounts {
    /// Percentage of expected items found, rounded down.
    pub fn progress_percent(&self) -> u8 {
        if self.expected == 0 {
            return 100;
        }
        ((self.found * 100) / self.expected).min(100) as u8
    }
}

/// Criteria for the displayed subset of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FilterCriteria {
    pub status: Option<OpnameStatus>,
    /// Case-insensitive match on title, item code, locations or EPC.
    pub text: Option<String>,
    pub new_only: bool,
}

impl FilterCriteria {
    pub fn by_status(status: OpnameStatus) -> Self {
        FilterCriteria {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn by_text(text: impl Into<String>) -> Self {
        FilterCriteria {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn new_only() -> Self {
        FilterCriteria {
            new_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, item: &SessionItem) -> bool {
        if self.new_only && !item.is_new_or_unexpected {
            return false;
        }
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => item.matches_text(&text.to_lowercase()),
            _ => true,
        }
    }
}

// =============================================================================
// Scan Resolution
// =============================================================================

/// Outcome of one resolved identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanResolution {
    /// A catalog item seen for the first time in this session.
    Found { key: String, title: String },
    /// A catalog item that was already found; nothing changed.
    AlreadyFound { key: String, title: String },
    /// No catalog item carries this identifier.
    Unexpected {
        identifier: String,
        method: ScanMethod,
        first_sighting: bool,
    },
}

impl ScanResolution {
    /// Whether the session changed.
    pub fn changed_session(&self) -> bool {
        match self {
            ScanResolution::Found { .. } => true,
            ScanResolution::AlreadyFound { .. } => false,
            ScanResolution::Unexpected { first_sighting, .. } => *first_sighting,
        }
    }

    /// Status line for the operator.
    pub fn message(&self) -> String {
        match self {
            ScanResolution::Found { title, .. } => format!("Found: {}", title),
            ScanResolution::AlreadyFound { title, .. } => format!("Already scanned: {}", title),
            ScanResolution::Unexpected {
                identifier,
                method,
                first_sighting: true,
            } => format!("Not in catalog ({}): {}", method, identifier),
            ScanResolution::Unexpected { identifier, .. } => {
                format!("Unexpected item seen again: {}", identifier)
            }
        }
    }
}

// =============================================================================
// Scan Session
// =============================================================================

/// Immutable view of the session header for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSnapshot {
    pub session_id: String,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    pub counts: SessionCounts,
    pub filter: FilterCriteria,
    pub location: Option<String>,
    pub closed: bool,
}

/// One stock-take run.
#[derive(Debug, Clone)]
pub struct ScanSession {
    session_id: String,
    started_at: DateTime<Utc>,
    /// Catalog items by item code.
    items: BTreeMap<String, SessionItem>,
    /// EPC to item code, for UHF reads.
    by_epc: HashMap<String, String>,
    /// Item codes repeated in the catalog; only the first entry is kept.
    duplicates: Vec<String>,
    /// Keyed by `"{method}:{identifier}"` so the two key spaces stay apart.
    unexpected: BTreeMap<String, SessionItem>,
    counts: SessionCounts,
    filter: FilterCriteria,
    location: Option<String>,
    closed: bool,
}

impl ScanSession {
    fn build(catalog: Vec<CatalogEntry>, started_at: DateTime<Utc>, keep_found: bool) -> Self {
        let mut items: BTreeMap<String, SessionItem> = BTreeMap::new();
        let mut by_epc = HashMap::new();
        let mut duplicates = Vec::new();

        for entry in &catalog {
            if items.contains_key(&entry.item_code) {
                duplicates.push(entry.item_code.clone());
                continue;
            }
            let mut item = SessionItem::from_entry(entry);

            if keep_found && entry.opname_status == OpnameStatus::Found {
                item.status = OpnameStatus::Found;
                item.last_seen = entry.last_seen_timestamp;
                item.scan_method = entry.last_scan_method;
                item.actual_location = entry.actual_scanned_location.clone();
            }

            if let Some(epc) = &item.rfid_tag_hex {
                by_epc
                    .entry(epc.clone())
                    .or_insert_with(|| entry.item_code.clone());
            }
            items.insert(entry.item_code.clone(), item);
        }

        let expected = items.len();
        let found = items
            .values()
            .filter(|i| i.status == OpnameStatus::Found)
            .count();

        ScanSession {
            session_id: Uuid::new_v4().to_string(),
            started_at,
            items,
            by_epc,
            duplicates,
            unexpected: BTreeMap::new(),
            counts: SessionCounts {
                expected,
                found,
                missing: expected - found,
                new: 0,
            },
            filter: FilterCriteria::default(),
            location: None,
            closed: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn counts(&self) -> SessionCounts {
        self.counts
    }

    /// Item code of the catalog item an identifier refers to, by method.
    fn lookup_item_code(&self, identifier: &str, method: ScanMethod) -> Option<&String> {
        match method {
            ScanMethod::Uhf => self.by_epc.get(identifier),
            ScanMethod::Barcode => self.items.get_key_value(identifier).map(|(code, _)| code),
        }
    }

    /// Looks an item up by its session key: the EPC of a tagged item, else
    /// its item code.
    pub fn item(&self, key: &str) -> Option<&SessionItem> {
        self.by_epc
            .get(key)
            .and_then(|code| self.items.get(code))
            .or_else(|| self.items.get(key))
    }

    /// Item codes skipped because an earlier catalog entry had the same one.
    pub fn duplicate_item_codes(&self) -> &[String] {
        &self.duplicates
    }

    /// Catalog items followed by unexpected sightings, unsorted.
    pub fn all_items(&self) -> impl Iterator<Item = &SessionItem> {
        self.items.values().chain(self.unexpected.values())
    }
}

fn normalize_identifier(identifier: &str, method: ScanMethod) -> CoreResult<String> {
    let normalized = match method {
        ScanMethod::Uhf => normalize_epc(identifier),
        ScanMethod::Barcode => normalize_item_code(identifier),
    };
    if normalized.is_empty() {
        return Err(ValidationError::Required {
            field: "identifier".to_string(),
        }
        .into());
    }
    Ok(normalized)
}

fn sort_for_display(items: &mut [SessionItem]) {
    items.sort_by(|a, b| {
        b.status
            .is_unresolved()
            .cmp(&a.status.is_unresolved())
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            .then_with(|| a.key.cmp(&b.key))
    });
}

// =============================================================================
// Reconciliation Engine
// =============================================================================

/// Owns at most one session at a time.
#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    session: Option<ScanSession>,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh session in which every catalog entry is `NotScanned`.
    ///
    /// Entries whose item code repeats an earlier entry are skipped and
    /// listed in [`ScanSession::duplicate_item_codes`]. Replaces any previous
    /// session.
    pub fn start_session(&mut self, catalog: Vec<CatalogEntry>, now: DateTime<Utc>) -> &ScanSession {
        self.session.insert(ScanSession::build(catalog, now, false))
    }

    /// Rebuilds a session from persisted sightings: entries already `Found`
    /// stay found, everything else starts `NotScanned`.
    pub fn resume_session(
        &mut self,
        catalog: Vec<CatalogEntry>,
        now: DateTime<Utc>,
    ) -> &ScanSession {
        self.session.insert(ScanSession::build(catalog, now, true))
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    fn open_session(&self) -> CoreResult<&ScanSession> {
        let session = self.session.as_ref().ok_or(CoreError::NoActiveSession)?;
        if session.closed {
            return Err(CoreError::SessionClosed(session.session_id.clone()));
        }
        Ok(session)
    }

    fn open_session_mut(&mut self) -> CoreResult<&mut ScanSession> {
        let session = self.session.as_mut().ok_or(CoreError::NoActiveSession)?;
        if session.closed {
            return Err(CoreError::SessionClosed(session.session_id.clone()));
        }
        Ok(session)
    }

    /// The sighting a scan would record, if it matches a catalog item that is
    /// not yet found. Nothing is modified.
    ///
    /// Lets a caller persist the sighting before the in-memory session
    /// changes, so a failed write leaves the session untouched.
    pub fn pending_sighting(
        &self,
        identifier: &str,
        method: ScanMethod,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Sighting>> {
        let session = self.open_session()?;
        let identifier = normalize_identifier(identifier, method)?;

        let sighting = session
            .lookup_item_code(&identifier, method)
            .and_then(|code| session.items.get(code))
            .filter(|item| item.status != OpnameStatus::Found)
            .and_then(|item| item.item_code.clone())
            .map(|item_code| Sighting {
                item_code,
                status: OpnameStatus::Found,
                seen_at: now,
                method,
                location: session.location.clone(),
            });
        Ok(sighting)
    }

    /// Classifies an identifier and updates the session.
    ///
    /// ## Errors
    /// - No session, or the session is closed
    /// - Blank identifier
    pub fn resolve_scan(
        &mut self,
        identifier: &str,
        method: ScanMethod,
        now: DateTime<Utc>,
    ) -> CoreResult<ScanResolution> {
        let identifier = normalize_identifier(identifier, method)?;
        let session = self.open_session_mut()?;

        if let Some(code) = session.lookup_item_code(&identifier, method).cloned() {
            let location = session.location.clone();
            let item = session
                .items
                .get_mut(&code)
                .ok_or_else(|| CoreError::ItemNotFound(code.clone()))?;
            let key = item.key.clone();

            if item.status == OpnameStatus::Found {
                return Ok(ScanResolution::AlreadyFound {
                    key,
                    title: item.title.clone(),
                });
            }

            item.status = OpnameStatus::Found;
            item.last_seen = Some(now);
            item.scan_method = Some(method);
            item.actual_location = location;
            let title = item.title.clone();

            session.counts.found += 1;
            session.counts.missing -= 1;
            debug_assert_eq!(
                session.counts.found + session.counts.missing,
                session.counts.expected
            );

            return Ok(ScanResolution::Found { key, title });
        }

        let unexpected_key = format!("{}:{}", method, identifier);
        let first_sighting = !session.unexpected.contains_key(&unexpected_key);
        if first_sighting {
            let item = SessionItem::unexpected(&identifier, method, now, session.location.clone());
            session.unexpected.insert(unexpected_key, item);
            session.counts.new += 1;
        } else if let Some(item) = session.unexpected.get_mut(&unexpected_key) {
            item.last_seen = Some(now);
        }

        Ok(ScanResolution::Unexpected {
            identifier,
            method,
            first_sighting,
        })
    }

    /// Sets the location being audited; later first sightings carry it.
    pub fn set_location(&mut self, location: Option<String>) -> CoreResult<()> {
        let session = self.open_session_mut()?;
        session.location = location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        Ok(())
    }

    /// Replaces the active filter. The session itself is not touched.
    pub fn set_filter(&mut self, mut criteria: FilterCriteria) -> CoreResult<()> {
        if let Some(text) = criteria.text.take() {
            criteria.text = Some(validate_search_query(&text)?).filter(|t| !t.is_empty());
        }
        let session = self.session.as_mut().ok_or(CoreError::NoActiveSession)?;
        session.filter = criteria;
        Ok(())
    }

    pub fn counts(&self) -> CoreResult<SessionCounts> {
        self.session
            .as_ref()
            .map(|s| s.counts)
            .ok_or(CoreError::NoActiveSession)
    }

    /// The displayed subset under the active filter.
    ///
    /// Unresolved items sort first, then by title (case-insensitive).
    pub fn filtered_items(&self) -> CoreResult<Vec<SessionItem>> {
        let session = self.session.as_ref().ok_or(CoreError::NoActiveSession)?;
        let mut items: Vec<SessionItem> = session
            .all_items()
            .filter(|item| session.filter.matches(item))
            .cloned()
            .collect();
        sort_for_display(&mut items);
        Ok(items)
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(|s| SessionSnapshot {
            session_id: s.session_id.clone(),
            started_at: s.started_at,
            counts: s.counts,
            filter: s.filter.clone(),
            location: s.location.clone(),
            closed: s.closed,
        })
    }

    /// Builds the final report without modifying the session.
    ///
    /// Items still `NotScanned` are reported `Missing`. The caller persists
    /// the report and then calls [`close_session`](Self::close_session); if
    /// the save fails the session is still open and can be saved again.
    pub fn build_report(&self, name: &str, now: DateTime<Utc>) -> CoreResult<SessionReport> {
        let session = self.open_session()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: "report_name".to_string(),
            }
            .into());
        }

        let mut items: Vec<SessionReportItem> = session
            .items
            .values()
            .map(SessionItem::to_report_item)
            .collect();
        items.extend(session.unexpected.values().map(SessionItem::to_report_item));

        Ok(SessionReport {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            session_id: session.session_id.clone(),
            started_at: session.started_at,
            finished_at: now,
            expected_count: session.counts.expected as i64,
            found_count: session.counts.found as i64,
            missing_count: session.counts.missing as i64,
            new_count: session.counts.new as i64,
            items,
        })
    }

    /// Marks the session closed after its report was saved.
    pub fn close_session(&mut self) -> CoreResult<()> {
        let session = self.open_session_mut()?;
        for item in session.items.values_mut() {
            if item.status == OpnameStatus::NotScanned {
                item.status = OpnameStatus::Missing;
            }
        }
        session.closed = true;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
