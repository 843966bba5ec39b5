//! # Target EPC Derivation
//!
//! Computes the EPC written to a fresh tag from the item code it is paired to.
//!
//! ## Derivation
//! ```text
//!   item code  "B001"
//!       │  UTF-8 bytes → uppercase hex
//!       ▼
//!   "42303031"
//!       │  right-pad with '0' / truncate to 24 digits (96-bit EPC)
//!       ▼
//!   "423030310000000000000000"
//! ```
//!
//! Codes longer than 12 bytes are truncated, so two codes that share their
//! first 12 bytes derive the same EPC. The database's unique index on
//! `rfid_tag_hex` rejects the second pairing in that case.

use crate::validation::{validate_epc_hex, validate_item_code, ValidationResult};
use crate::TARGET_EPC_HEX_LEN;

/// Derives the fixed-width target EPC for an item code.
///
/// ## Errors
/// - Blank or malformed item code
/// - A derived value that fails EPC validation (never sent to the reader)
///
/// ## Example
/// ```rust
/// use opname_core::epc::derive_target_epc;
///
/// assert_eq!(derive_target_epc("B001").unwrap(), "423030310000000000000000");
/// ```
pub fn derive_target_epc(item_code: &str) -> ValidationResult<String> {
    validate_item_code(item_code)?;

    let mut hex: String = item_code
        .trim()
        .bytes()
        .map(|b| format!("{:02X}", b))
        .collect();

    if hex.len() > TARGET_EPC_HEX_LEN {
        hex.truncate(TARGET_EPC_HEX_LEN);
    }
    while hex.len() < TARGET_EPC_HEX_LEN {
        hex.push('0');
    }

    validate_epc_hex(&hex)?;
    Ok(hex)
}

/// Recovers the printable item-code prefix encoded in a derived EPC.
///
/// Returns `None` if the EPC is not valid hex or the bytes are not UTF-8.
/// Trailing zero padding is dropped.
pub fn decode_item_code_prefix(epc: &str) -> Option<String> {
    let epc = epc.trim();
    if epc.len() % 2 != 0 {
        return None;
    }

    let mut bytes = Vec::with_capacity(epc.len() / 2);
    for i in (0..epc.len()).step_by(2) {
        let byte = u8::from_str_radix(epc.get(i..i + 2)?, 16).ok()?;
        bytes.push(byte);
    }
    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    String::from_utf8(bytes).ok()
}

/// Compares two EPCs ignoring case and surrounding whitespace.
pub fn epc_matches(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
