//! # Error Types
//!
//! Domain-specific error types for opname-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  opname-core errors (this file)                                         │
//! │  ├── CoreError        - Session / pairing rule violations               │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  opname-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  opname-scan errors (separate crate)                                    │
//! │  └── ScanError        - What the station hands to its callers           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ScanError → UI status line         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::pairing::TaggingState;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations raised by the pure state machines.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An operation needs a stock-take session but none was started.
    #[error("No stock-take session is active")]
    NoActiveSession,

    /// The session was finalized; start a new one to keep scanning.
    #[error("Stock-take session {0} is already closed")]
    SessionClosed(String),

    /// The TaggingState graph has no edge between the two states.
    ///
    /// ## When This Occurs
    /// - Calling start pairing before an item was looked up
    /// - A write result arriving while no write is in flight
    /// - Searching for a new item while the device is mid-operation
    #[error("Pairing cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: TaggingState, to: TaggingState },

    /// The workflow is not in a state that accepts the requested step.
    #[error("Pairing step not allowed while {state:?}")]
    PairingNotReady { state: TaggingState },

    /// Catalog lookup failed.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Detected locally, before anything reaches the reader or the database.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., non-hex EPC).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Length constraint that is not a simple maximum.
    #[error("{field} has invalid length {len}: {reason}")]
    InvalidLength {
        field: String,
        len: usize,
        reason: String,
    },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
