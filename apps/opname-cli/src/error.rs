//! # CLI Error Type
//!
//! One error type for every command, with a machine-readable code that
//! becomes the process exit status.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Command Function                                                       │
//! │  Result<T, CliError>                                                    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Database Error? ─── DbError::QueryFailed("...") ──────┐                │
//! │  Core Error?     ─── CoreError::Validation(..) ────────┤                │
//! │  Station Error?  ─── ScanError::Timeout(7) ────────────┼──► CliError    │
//! │                                                        │                │
//! │  main() prints "error: [NotFound] ..." and exits with code.exit_code()  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use opname_core::{CoreError, ValidationError};
use opname_db::DbError;
use opname_scan::ScanError;

/// Error returned from CLI commands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CliError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

pub type CliResult<T> = Result<T, CliError>;

/// Error codes, one exit status each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Entry or report not found
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Database operation failed
    DatabaseError,

    /// Reader refused, failed or timed out
    DeviceError,

    /// Workflow step not allowed in the current state
    WorkflowError,

    /// Config file or environment is invalid
    ConfigError,

    /// Internal error
    Internal,
}

impl ErrorCode {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::NotFound => 3,
            ErrorCode::ValidationError => 4,
            ErrorCode::DatabaseError => 5,
            ErrorCode::DeviceError => 6,
            ErrorCode::WorkflowError => 7,
            ErrorCode::ConfigError => 78,
            ErrorCode::Internal => 1,
        }
    }
}

impl CliError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        CliError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        CliError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CliError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CliError::new(ErrorCode::Internal, message)
    }
}

/// Converts database errors to CLI errors.
impl From<DbError> for CliError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CliError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => CliError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                CliError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::PoolExhausted => {
                CliError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            other => {
                tracing::error!(error = %other, "Database operation failed");
                CliError::new(ErrorCode::DatabaseError, other.to_string())
            }
        }
    }
}

/// Converts core errors to CLI errors.
impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ItemNotFound(key) => CliError::not_found("Item", &key),
            CoreError::Validation(e) => e.into(),
            other => CliError::new(ErrorCode::WorkflowError, other.to_string()),
        }
    }
}

impl From<ValidationError> for CliError {
    fn from(err: ValidationError) -> Self {
        CliError::validation(err.to_string())
    }
}

/// Converts station errors to CLI errors.
impl From<ScanError> for CliError {
    fn from(err: ScanError) -> Self {
        let code = match err {
            ScanError::Core(core) => return core.into(),
            ref e if e.is_config_error() => ErrorCode::ConfigError,
            ScanError::Device(_) | ScanError::Timeout(_) => ErrorCode::DeviceError,
            ScanError::Busy(_) | ScanError::ModeConflict { .. } => ErrorCode::WorkflowError,
            ScanError::Persistence(_) => ErrorCode::DatabaseError,
            _ => ErrorCode::Internal,
        };
        CliError::new(code, err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(format!("JSON output failed: {}", err))
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_errors_map_to_codes() {
        let err: CliError = ScanError::Timeout(7).into();
        assert_eq!(err.code, ErrorCode::DeviceError);
        assert_eq!(err.message, "No tag read within 7 seconds");

        let err: CliError = ScanError::InvalidConfig("bad".into()).into();
        assert_eq!(err.code, ErrorCode::ConfigError);
        assert_eq!(err.code.exit_code(), 78);

        let err: CliError = ScanError::Core(CoreError::NoActiveSession).into();
        assert_eq!(err.code, ErrorCode::WorkflowError);

        let err: CliError = ScanError::from(ValidationError::Required {
            field: "item_code".into(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_db_errors_map_to_codes() {
        let err: CliError = DbError::not_found("CatalogEntry", "B001").into();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.message.contains("B001"));

        let err: CliError = DbError::UniqueViolation {
            field: "item_code".into(),
            value: "B001".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
