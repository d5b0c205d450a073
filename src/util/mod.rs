use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(bytes);
    h.finalize().into()
}

pub fn is_address(s: &str) -> bool {
    // 0x + 40 hex chars = 42 total
    if s.len() != 42 {
        return false;
    }
    if !s.starts_with("0x") && !s.starts_with("0X") {
        return false;
    }
    s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_hex_string(s: &str) -> bool {
    if !s.starts_with("0x") && !s.starts_with("0X") {
        return false;
    }
    s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn hex_to_bytes(hexstr: &str) -> Result<Vec<u8>, String> {
    let s = strip_0x(hexstr);
    if s.is_empty() {
        return Ok(vec![]);
    }
    hex::decode(s).map_err(|e| e.to_string())
}

/// EIP-55 mixed-case checksum encoding.
pub fn checksum_address(address: &str) -> String {
    let lower = strip_0x(address).to_lowercase();
    let hash = keccak256(lower.as_bytes());
    let hash_hex = hex::encode(hash);
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = hash_hex.as_bytes()[i];
        if c.is_ascii_alphabetic() && nibble >= b'8' {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `0x1234...abcd` form used in summaries and public profiles.
pub fn truncate_address(addr: &str) -> String {
    if addr.len() < 10 {
        return addr.to_string();
    }
    format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
}

/// Decimal rendering of a 256-bit hex quantity (no 0x prefix required).
/// Repeated division by 10 over the byte representation; no bigint crate
/// in the stack, and this path only runs on already-validated hex.
pub fn hex_to_decimal(hexstr: &str) -> String {
    let s = strip_0x(hexstr);
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return "0".to_string();
    }
    // Fast path for values that fit in u128
    if trimmed.len() <= 32 {
        if let Ok(v) = u128::from_str_radix(trimmed, 16) {
            return v.to_string();
        }
    }
    let padded = if trimmed.len() % 2 == 1 {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    };
    let mut bytes = match hex::decode(&padded) {
        Ok(b) => b,
        Err(_) => return "0".to_string(),
    };
    let mut digits = Vec::new();
    while bytes.iter().any(|&b| b != 0) {
        let mut rem: u32 = 0;
        for b in bytes.iter_mut() {
            let acc = rem * 256 + *b as u32;
            *b = (acc / 10) as u8;
            rem = acc % 10;
        }
        digits.push((b'0' + rem as u8) as char);
    }
    digits.iter().rev().collect()
}

/// Approximate f64 value of a hex quantity. Loses precision above 2^53;
/// only used for display estimates and thresholds.
pub fn hex_to_f64(hexstr: &str) -> f64 {
    let s = strip_0x(hexstr);
    let mut acc = 0.0f64;
    for c in s.chars() {
        match c.to_digit(16) {
            Some(d) => acc = acc * 16.0 + d as f64,
            None => return 0.0,
        }
    }
    acc
}

/// Approximate f64 value of a decimal string.
pub fn decimal_to_f64(s: &str) -> f64 {
    s.parse::<f64>().unwrap_or(0.0)
}

/// Render a wei-scale u128 as an ether-denominated string.
pub fn format_units18_u128(v: u128) -> String {
    let whole = v / 1_000_000_000_000_000_000;
    let frac = v % 1_000_000_000_000_000_000;
    let frac_str = format!("{:018}", frac);
    let frac_trimmed = frac_str.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac_trimmed}")
    }
}

/// Render a wei-scale hex quantity as an ether-denominated string.
pub fn format_units18(hexstr: &str) -> String {
    let trimmed = strip_0x(hexstr).trim_start_matches('0');
    if trimmed.is_empty() {
        return "0.0".to_string();
    }
    if trimmed.len() <= 32 {
        if let Ok(v) = u128::from_str_radix(trimmed, 16) {
            return format_units18_u128(v);
        }
    }
    format!("{}", hex_to_f64(trimmed) / 1e18)
}

/// Parse a wei amount given as either a decimal string or 0x-hex.
pub fn parse_wei(value: &str) -> u128 {
    let v = value.trim();
    if v.is_empty() {
        return 0;
    }
    if let Some(hexpart) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        return u128::from_str_radix(hexpart, 16).unwrap_or(0);
    }
    v.parse::<u128>().unwrap_or(0)
}

/// `1234567` to `1,234,567`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksums_a_known_address() {
        assert_eq!(
            checksum_address("0xcc75959a8fa6ed76f64172925c0799ad94ab0b84"),
            "0xCc75959A8Fa6ed76F64172925c0799ad94ab0B84"
        );
    }

    #[test]
    fn hex_to_decimal_handles_max_uint256() {
        let all_f = "f".repeat(64);
        assert_eq!(
            hex_to_decimal(&all_f),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn hex_to_decimal_small_values() {
        assert_eq!(hex_to_decimal("0x0"), "0");
        assert_eq!(hex_to_decimal("0xde0b6b3a7640000"), "1000000000000000000");
    }

    #[test]
    fn formats_wei_as_ether() {
        assert_eq!(format_units18("0xde0b6b3a7640000"), "1.0");
        assert_eq!(format_units18("0x0"), "0.0");
        assert_eq!(format_units18("0x1bc16d674ec80000"), "2.0");
    }

    #[test]
    fn truncates_addresses() {
        assert_eq!(
            truncate_address("0xCc75959A8Fa6ed76F64172925c0799ad94ab0B84"),
            "0xCc75...0B84"
        );
        assert_eq!(truncate_address("0x12"), "0x12");
    }
}
