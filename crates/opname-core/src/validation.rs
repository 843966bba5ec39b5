//! # Validation Module
//!
//! Input validation for identifiers that reach the reader or the database.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Station command (opname-scan)                                 │
//! │  └── THIS MODULE: item codes, EPC hex, access passwords                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Reader (HardwareFacade)                                       │
//! │  └── Only ever receives values that passed layer 1                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── PRIMARY KEY on item_code                                           │
//! │  └── UNIQUE index on rfid_tag_hex                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use opname_core::validation::{validate_epc_hex, validate_item_code};
//!
//! validate_item_code("B-00123").unwrap();
//! validate_epc_hex("E28011700000020F").unwrap();
//! assert!(validate_epc_hex("E28").is_err());
//! ```

use crate::error::ValidationError;
use crate::MAX_ITEM_CODE_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a catalog item code.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_ITEM_CODE_LEN`] characters
/// - No whitespace or control characters inside the code
pub fn validate_item_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "item_code".to_string(),
        });
    }

    if code.chars().count() > MAX_ITEM_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "item_code".to_string(),
            max: MAX_ITEM_CODE_LEN,
        });
    }

    if code.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: "item_code".to_string(),
            reason: "must not contain whitespace or control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates an EPC destined for the reader.
///
/// ## Rules
/// - Must not be blank
/// - Length must be a positive multiple of 4 hex digits (whole 16-bit words)
/// - Only `0-9`, `a-f`, `A-F`
///
/// Nothing that fails here is ever passed to `write_tag`.
pub fn validate_epc_hex(epc: &str) -> ValidationResult<()> {
    let epc = epc.trim();

    if epc.is_empty() {
        return Err(ValidationError::Required {
            field: "epc".to_string(),
        });
    }

    if epc.len() % 4 != 0 {
        return Err(ValidationError::InvalidLength {
            field: "epc".to_string(),
            len: epc.len(),
            reason: "must be a positive multiple of 4 hex digits".to_string(),
        });
    }

    if let Some(bad) = epc.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidFormat {
            field: "epc".to_string(),
            reason: format!("non-hex character '{}'", bad),
        });
    }

    Ok(())
}

/// Validates a reader access password (32-bit, 8 hex digits).
pub fn validate_access_password(password: &str) -> ValidationResult<()> {
    let password = password.trim();

    if password.len() != 8 || !password.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidFormat {
            field: "access_password".to_string(),
            reason: "must be exactly 8 hex digits".to_string(),
        });
    }

    Ok(())
}

/// Validates an entry title.
pub fn validate_title(title: &str) -> ValidationResult<()> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::Required {
            field: "title".to_string(),
        });
    }

    if title.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: 500,
        });
    }

    Ok(())
}

/// Validates a free-text filter query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Normalization
// =============================================================================

/// Canonical EPC form: trimmed, uppercase.
///
/// Readers report EPCs in either case; the catalog stores them uppercase.
pub fn normalize_epc(epc: &str) -> String {
    epc.trim().to_uppercase()
}

/// Canonical item-code form: trimmed, case preserved.
pub fn normalize_item_code(code: &str) -> String {
    code.trim().to_string()
}
