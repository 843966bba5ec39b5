//! # Repository Module
//!
//! Database repository implementations for the stock-take tool.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ScanStation / CLI                                                      │
//! │       │                                                                 │
//! │       │  db.catalog().find_by_rfid_tag("E280...")                       │
//! │       ▼                                                                 │
//! │  CatalogRepository                                                      │
//! │  ├── load_catalog / find_by_item_code / find_by_rfid_tag                │
//! │  ├── update_pairing        (pairing fields only)                        │
//! │  ├── record_sighting       (opname fields only)                         │
//! │  └── insert / search / count / clear                                    │
//! │                                                                         │
//! │  ReportRepository                                                       │
//! │  ├── save_session_report   (one transaction)                            │
//! │  └── list_reports / get_report / get_items                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Catalog entries
//! - [`ReportRepository`](report::ReportRepository) - Finalized sessions

pub mod catalog;
pub mod report;
