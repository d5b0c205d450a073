//! Field-level request validation. Pure checks collected into a list so
//! the API layer can return every problem at once.

use serde::Serialize;

use crate::registry::VALID_CHAIN_IDS;
use crate::util;

// 100KB of raw bytes once the hex is decoded.
const MAX_HEX_DATA_BYTES: usize = 100 * 1024;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn is_valid_address(address: &str) -> bool {
    util::is_address(address)
}

pub fn is_valid_chain_id(chain_id: u64) -> bool {
    VALID_CHAIN_IDS.contains(&chain_id)
}

pub fn is_valid_hex_string(hex: &str) -> bool {
    util::is_hex_string(hex)
}

pub fn is_valid_hex_size(hex: &str) -> bool {
    let hex_len = util::strip_0x(hex).len();
    hex_len / 2 <= MAX_HEX_DATA_BYTES
}

pub fn check_address(errors: &mut Vec<ValidationError>, field: &str, address: &str) {
    if address.is_empty() {
        errors.push(ValidationError::new(field, format!("{field} is required")));
    } else if !is_valid_address(address) {
        errors.push(ValidationError::new(
            field,
            "Invalid Ethereum address format",
        ));
    }
}

pub fn check_hex_data(errors: &mut Vec<ValidationError>, field: &str, hex: &str) {
    if !is_valid_hex_string(hex) {
        errors.push(ValidationError::new(field, "Invalid hex string format"));
    } else if !is_valid_hex_size(hex) {
        errors.push(ValidationError::new(
            field,
            "Data exceeds maximum size of 100KB",
        ));
    }
}

pub fn check_chain_id(errors: &mut Vec<ValidationError>, chain_id: Option<u64>) {
    if let Some(id) = chain_id {
        if !is_valid_chain_id(id) {
            errors.push(ValidationError::new(
                "chainId",
                "Invalid chain ID. Supported: 1, 8453, 10, 42161",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_shape_is_enforced() {
        assert!(is_valid_address(
            "0xCc75959A8Fa6ed76F64172925c0799ad94ab0B84"
        ));
        assert!(!is_valid_address("0x1234"));
        assert!(!is_valid_address(
            "Cc75959A8Fa6ed76F64172925c0799ad94ab0B8400"
        ));
    }

    #[test]
    fn chain_allow_list() {
        for id in [1, 8453, 10, 42161] {
            assert!(is_valid_chain_id(id));
        }
        assert!(!is_valid_chain_id(137));
        assert!(!is_valid_chain_id(5));
    }

    #[test]
    fn hex_size_cap_at_100kb() {
        let ok = format!("0x{}", "ab".repeat(100 * 1024));
        let too_big = format!("0x{}", "ab".repeat(100 * 1024 + 1));
        assert!(is_valid_hex_size(&ok));
        assert!(!is_valid_hex_size(&too_big));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut errors = Vec::new();
        check_address(&mut errors, "to", "nope");
        check_hex_data(&mut errors, "data", "zz");
        check_chain_id(&mut errors, Some(5));
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].field, "to");
    }
}
