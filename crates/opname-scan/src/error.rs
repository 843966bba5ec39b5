//! # Scan Error Types
//!
//! Error types for reader coordination and the workflows built on it.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Scan Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Device      │  │     Coordination        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Device         │  │  Busy                   │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  ModeConflict           │ │
//! │  │  ConfigSave     │  │                 │  │  Core (rule violation)  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Persistence   │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Persistence    │  │  ChannelError   │                              │
//! │  │                 │  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate retries on its own. `is_retryable` only tells the
//! UI whether offering "try again" makes sense.

use thiserror::Error;

use opname_core::{CoreError, ScanMethod};

use crate::coordinator::DeviceOperation;

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Every failure the station reports to its callers.
#[derive(Debug, Error)]
pub enum ScanError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid station configuration.
    #[error("Invalid station configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Device Errors
    // =========================================================================
    /// The reader rejected a command or reported a fault.
    #[error("Reader error: {0}")]
    Device(String),

    /// Single-shot read produced no result in time.
    #[error("No tag read within {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Coordination Errors
    // =========================================================================
    /// A write, TID read or lock is still outstanding.
    #[error("Reader is busy ({0})")]
    Busy(DeviceOperation),

    /// The other modality is active and must be stopped first.
    #[error("{active} scan is active; cannot start {requested}")]
    ModeConflict {
        active: ScanMethod,
        requested: ScanMethod,
    },

    /// Domain rule violation (session closed, bad transition, validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// Catalog or report storage failed; in-memory state is unchanged.
    #[error("Storage error: {0}")]
    Persistence(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Station is shutting down.
    #[error("Scan station is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<opname_db::DbError> for ScanError {
    fn from(err: opname_db::DbError) -> Self {
        ScanError::Persistence(err.to_string())
    }
}

impl From<opname_core::ValidationError> for ScanError {
    fn from(err: opname_core::ValidationError) -> Self {
        ScanError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(err: toml::de::Error) -> Self {
        ScanError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ScanError {
    fn from(err: toml::ser::Error) -> Self {
        ScanError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ScanError {
    /// Returns true if the operator can simply re-issue the command.
    ///
    /// ## Retryable Errors
    /// - Device faults and timeouts (re-toggle the scan)
    /// - Busy reader (wait for the outstanding operation)
    /// - Storage failures (nothing changed in memory, save again)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScanError::Device(_)
                | ScanError::Timeout(_)
                | ScanError::Busy(_)
                | ScanError::Persistence(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidConfig(_)
                | ScanError::ConfigLoadFailed(_)
                | ScanError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the error was detected locally, before the reader or
    /// the database were involved.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, ScanError::Core(CoreError::Validation(_)))
    }
}
