//! Minimal ABI machinery: parse function signatures (human-readable or
//! explorer JSON), compute selectors, and decode calldata words into
//! display values. Covers the type surface the known-ABI bundle and
//! common verified contracts actually use; exotic shapes fall through
//! to the raw heuristic parse.

use crate::util;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint(u32),
    Int(u32),
    Bool,
    Bytes,
    FixedBytes(usize),
    Str,
    Array(Box<ParamType>),
    Tuple(Vec<Param>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamType,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub inputs: Vec<Param>,
    /// Canonical form, e.g. `approve(address,uint256)`.
    pub signature: String,
    /// `0x`-prefixed 4-byte selector of the canonical signature.
    pub selector: String,
}

impl FunctionDef {
    pub fn new(name: String, inputs: Vec<Param>) -> Self {
        let types: Vec<String> = inputs.iter().map(|p| canonical_type(&p.kind)).collect();
        let signature = format!("{}({})", name, types.join(","));
        let hash = util::keccak256(signature.as_bytes());
        let selector = format!("0x{}", hex::encode(&hash[..4]));
        Self {
            name,
            inputs,
            signature,
            selector,
        }
    }
}

pub fn canonical_type(kind: &ParamType) -> String {
    match kind {
        ParamType::Address => "address".to_string(),
        ParamType::Uint(bits) => format!("uint{bits}"),
        ParamType::Int(bits) => format!("int{bits}"),
        ParamType::Bool => "bool".to_string(),
        ParamType::Bytes => "bytes".to_string(),
        ParamType::FixedBytes(n) => format!("bytes{n}"),
        ParamType::Str => "string".to_string(),
        ParamType::Array(inner) => format!("{}[]", canonical_type(inner)),
        ParamType::Tuple(components) => {
            let inner: Vec<String> = components.iter().map(|c| canonical_type(&c.kind)).collect();
            format!("({})", inner.join(","))
        }
    }
}

// ── Human-readable signature parsing ────────────────────────────────

/// Parse one `function name(type name, ...) ...` declaration. The
/// return clause and mutability keywords are ignored.
pub fn parse_signature(decl: &str) -> Option<FunctionDef> {
    let decl = decl.trim();
    let decl = decl.strip_prefix("function ").unwrap_or(decl).trim();
    let open = decl.find('(')?;
    let name = decl[..open].trim().to_string();
    if name.is_empty() {
        return None;
    }
    let close = matching_paren(decl, open)?;
    let inputs = parse_param_list(&decl[open + 1..close])?;
    Some(FunctionDef::new(name, inputs))
}

fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices().skip(open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(src: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in src.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < src.len() {
        parts.push(&src[start..]);
    }
    parts
}

fn parse_param_list(src: &str) -> Option<Vec<Param>> {
    let src = src.trim();
    if src.is_empty() {
        return Some(Vec::new());
    }
    split_top_level(src).iter().map(|p| parse_param(p)).collect()
}

const MODIFIERS: [&str; 5] = ["memory", "calldata", "storage", "indexed", "payable"];

fn parse_param(src: &str) -> Option<Param> {
    let src = src.trim();
    if src.starts_with('(') {
        // tuple component list, then optional [] suffixes and a name
        let close = matching_paren(src, 0)?;
        let components = parse_param_list(&src[1..close])?;
        let mut kind = ParamType::Tuple(components);
        let mut rest = src[close + 1..].trim();
        while let Some(r) = rest.strip_prefix("[]") {
            kind = ParamType::Array(Box::new(kind));
            rest = r.trim();
        }
        let name = rest
            .split_whitespace()
            .filter(|t| !MODIFIERS.contains(t))
            .last()
            .unwrap_or("")
            .to_string();
        return Some(Param { name, kind });
    }
    let mut tokens = src.split_whitespace();
    let type_str = tokens.next()?;
    let name = tokens
        .filter(|t| !MODIFIERS.contains(t))
        .last()
        .unwrap_or("")
        .to_string();
    Some(Param {
        name,
        kind: parse_type(type_str)?,
    })
}

fn parse_type(type_str: &str) -> Option<ParamType> {
    let mut base = type_str;
    let mut array_depth = 0usize;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        array_depth += 1;
    }
    let mut kind = match base {
        "address" => ParamType::Address,
        "bool" => ParamType::Bool,
        "string" => ParamType::Str,
        "bytes" => ParamType::Bytes,
        "uint" => ParamType::Uint(256),
        "int" => ParamType::Int(256),
        _ => {
            if let Some(bits) = base.strip_prefix("uint") {
                ParamType::Uint(bits.parse().ok()?)
            } else if let Some(bits) = base.strip_prefix("int") {
                ParamType::Int(bits.parse().ok()?)
            } else if let Some(n) = base.strip_prefix("bytes") {
                ParamType::FixedBytes(n.parse().ok()?)
            } else {
                return None;
            }
        }
    };
    for _ in 0..array_depth {
        kind = ParamType::Array(Box::new(kind));
    }
    Some(kind)
}

// ── Explorer ABI JSON parsing ───────────────────────────────────────

/// Extract function definitions from a standard ABI JSON array, the
/// shape returned by block explorers and verification services.
pub fn functions_from_abi_json(abi: &Value) -> Vec<FunctionDef> {
    let Some(entries) = abi.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|e| e.get("type").and_then(|t| t.as_str()) == Some("function"))
        .filter_map(|e| {
            let name = e.get("name")?.as_str()?.to_string();
            let inputs = e
                .get("inputs")
                .and_then(|i| i.as_array())
                .map(|arr| arr.iter().filter_map(param_from_json).collect::<Vec<_>>())
                .unwrap_or_default();
            Some(FunctionDef::new(name, inputs))
        })
        .collect()
}

fn param_from_json(entry: &Value) -> Option<Param> {
    let name = entry
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or("")
        .to_string();
    let type_str = entry.get("type")?.as_str()?;
    let mut base = type_str;
    let mut array_depth = 0usize;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        array_depth += 1;
    }
    let mut kind = if base == "tuple" {
        let components = entry
            .get("components")
            .and_then(|c| c.as_array())
            .map(|arr| arr.iter().filter_map(param_from_json).collect::<Vec<_>>())
            .unwrap_or_default();
        ParamType::Tuple(components)
    } else {
        parse_type(base)?
    };
    for _ in 0..array_depth {
        kind = ParamType::Array(Box::new(kind));
    }
    Some(Param { name, kind })
}

// ── Calldata decoding ───────────────────────────────────────────────

fn is_dynamic(kind: &ParamType) -> bool {
    match kind {
        ParamType::Bytes | ParamType::Str | ParamType::Array(_) => true,
        ParamType::Tuple(components) => components.iter().any(|c| is_dynamic(&c.kind)),
        _ => false,
    }
}

/// Bytes the type occupies in the head section of its frame.
fn head_bytes(kind: &ParamType) -> usize {
    match kind {
        ParamType::Tuple(components) if !is_dynamic(kind) => {
            components.iter().map(|c| head_bytes(&c.kind)).sum()
        }
        _ => 32,
    }
}

fn word_at(args: &str, byte_off: usize) -> Option<&str> {
    args.get(byte_off * 2..byte_off * 2 + 64)
}

fn usize_at(args: &str, byte_off: usize) -> Option<usize> {
    let word = word_at(args, byte_off)?;
    let trimmed = word.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(0);
    }
    if trimmed.len() > 16 {
        return None;
    }
    u64::from_str_radix(trimmed, 16).ok().map(|v| v as usize)
}

// Defensive caps against hostile offsets.
const MAX_ARRAY_LEN: usize = 1024;
const MAX_BYTES_LEN: usize = 256 * 1024;

/// Decode calldata (with selector) against a parameter list. `None`
/// means the data does not match the shape; the caller moves to the
/// next fallback.
pub fn decode_inputs(calldata: &str, inputs: &[Param]) -> Option<Vec<Value>> {
    let hex = util::strip_0x(calldata).to_lowercase();
    if hex.len() < 8 {
        return None;
    }
    let args = &hex[8..];
    if args.len() % 2 != 0 {
        return None;
    }
    decode_frame(args, 0, inputs)
}

fn decode_frame(args: &str, base: usize, components: &[Param]) -> Option<Vec<Value>> {
    let mut out = Vec::with_capacity(components.len());
    let mut at = base;
    for c in components {
        out.push(decode_value(args, at, base, &c.kind)?);
        at += head_bytes(&c.kind);
    }
    Some(out)
}

fn decode_value(args: &str, head_at: usize, frame_base: usize, kind: &ParamType) -> Option<Value> {
    if is_dynamic(kind) {
        let offset = usize_at(args, head_at)?;
        let target = frame_base.checked_add(offset)?;
        return match kind {
            ParamType::Bytes | ParamType::Str => {
                let len = usize_at(args, target)?;
                if len > MAX_BYTES_LEN {
                    return None;
                }
                let data = args.get((target + 32) * 2..(target + 32) * 2 + len * 2)?;
                if matches!(kind, ParamType::Str) {
                    let bytes = hex::decode(data).ok()?;
                    Some(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
                } else {
                    Some(Value::String(format!("0x{data}")))
                }
            }
            ParamType::Array(elem) => {
                let len = usize_at(args, target)?;
                if len > MAX_ARRAY_LEN {
                    return None;
                }
                let elem_base = target + 32;
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    let head = elem_base + i * head_bytes(elem);
                    items.push(decode_value(args, head, elem_base, elem)?);
                }
                Some(Value::Array(items))
            }
            ParamType::Tuple(components) => {
                decode_frame(args, target, components).map(Value::Array)
            }
            _ => None,
        };
    }

    match kind {
        ParamType::Tuple(components) => {
            // Static tuple is laid out inline.
            decode_frame(args, head_at, components).map(Value::Array)
        }
        ParamType::Address => {
            let word = word_at(args, head_at)?;
            Some(Value::String(util::checksum_address(&word[24..64])))
        }
        ParamType::Uint(_) | ParamType::Int(_) => {
            let word = word_at(args, head_at)?;
            Some(Value::String(util::hex_to_decimal(word)))
        }
        ParamType::Bool => {
            let word = word_at(args, head_at)?;
            let last = u8::from_str_radix(&word[62..64], 16).ok()?;
            Some(Value::Bool(last != 0))
        }
        ParamType::FixedBytes(n) => {
            let word = word_at(args, head_at)?;
            Some(Value::String(format!("0x{}", &word[..(*n).min(32) * 2])))
        }
        _ => None,
    }
}

/// Render a decoded value for the wire: scalars pass through, arrays
/// and tuples are JSON-stringified.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_of_approve() {
        let def = parse_signature("function approve(address spender, uint256 amount) returns (bool)")
            .unwrap();
        assert_eq!(def.signature, "approve(address,uint256)");
        assert_eq!(def.selector, "0x095ea7b3");
        assert_eq!(def.inputs[0].name, "spender");
    }

    #[test]
    fn selector_of_exec_transaction() {
        let def = parse_signature(
            "function execTransaction(address to, uint256 value, bytes data, uint8 operation, \
             uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, \
             address refundReceiver, bytes signatures) returns (bool)",
        )
        .unwrap();
        assert_eq!(def.selector, "0x6a761202");
    }

    #[test]
    fn parses_nested_tuple_param() {
        let def = parse_signature(
            "function supply((address loanToken, address collateralToken, address oracle, \
             address irm, uint256 lltv) marketParams, uint256 assets, uint256 shares, \
             address onBehalf, bytes data) returns (uint256, uint256)",
        )
        .unwrap();
        assert_eq!(def.inputs[0].name, "marketParams");
        assert!(matches!(def.inputs[0].kind, ParamType::Tuple(_)));
        assert_eq!(
            def.signature,
            "supply((address,address,address,address,uint256),uint256,uint256,address,bytes)"
        );
    }

    #[test]
    fn decodes_static_params() {
        let spender = "1111111254eeb25477b68fb85ed929f73a960582";
        let calldata = format!("0x095ea7b3{:0>64}{:064x}", spender, 1000u64);
        let def =
            parse_signature("function approve(address spender, uint256 amount) returns (bool)")
                .unwrap();
        let values = decode_inputs(&calldata, &def.inputs).unwrap();
        assert_eq!(
            format_value(&values[0]),
            "0x1111111254EEB25477B68fb85Ed929f73A960582"
        );
        assert_eq!(format_value(&values[1]), "1000");
    }

    #[test]
    fn decodes_address_array() {
        // swapExactTokensForTokens head: amountIn, amountOutMin, offset(path), to, deadline
        let def = parse_signature(
            "function swapExactTokensForTokens(uint amountIn, uint amountOutMin, \
             address[] path, address to, uint deadline) returns (uint[] amounts)",
        )
        .unwrap();
        assert_eq!(def.selector, "0x38ed1739");
        let token_a = "c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
        let token_b = "a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
        let mut data = String::from("0x38ed1739");
        data.push_str(&format!("{:064x}", 5u64)); // amountIn
        data.push_str(&format!("{:064x}", 1u64)); // amountOutMin
        data.push_str(&format!("{:064x}", 160u64)); // offset to path
        data.push_str(&format!("{:0>64}", token_a)); // to (reuse an address)
        data.push_str(&format!("{:064x}", 99u64)); // deadline
        data.push_str(&format!("{:064x}", 2u64)); // path length
        data.push_str(&format!("{:0>64}", token_a));
        data.push_str(&format!("{:0>64}", token_b));
        let values = decode_inputs(&data, &def.inputs).unwrap();
        let path = format_value(&values[2]);
        assert!(path.starts_with('['));
        assert!(path.contains("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"));
    }

    #[test]
    fn decodes_dynamic_bytes() {
        let def = parse_signature("function run(bytes data)").unwrap();
        let mut calldata = format!("0x{}", &def.selector[2..]);
        calldata.push_str(&format!("{:064x}", 32u64)); // offset
        calldata.push_str(&format!("{:064x}", 3u64)); // length
        calldata.push_str(&format!("{:0<64}", "abcdef")); // padded payload
        let values = decode_inputs(&calldata, &def.inputs).unwrap();
        assert_eq!(format_value(&values[0]), "0xabcdef");
    }

    #[test]
    fn rejects_truncated_calldata() {
        let def =
            parse_signature("function approve(address spender, uint256 amount)").unwrap();
        assert!(decode_inputs("0x095ea7b300ff", &def.inputs).is_none());
    }

    #[test]
    fn reads_abi_json_with_tuple_components() {
        let abi: Value = serde_json::from_str(
            r#"[{"type":"function","name":"exactInputSingle","inputs":[
                {"name":"params","type":"tuple","components":[
                    {"name":"tokenIn","type":"address"},
                    {"name":"tokenOut","type":"address"},
                    {"name":"fee","type":"uint24"},
                    {"name":"recipient","type":"address"},
                    {"name":"deadline","type":"uint256"},
                    {"name":"amountIn","type":"uint256"},
                    {"name":"amountOutMinimum","type":"uint256"},
                    {"name":"sqrtPriceLimitX96","type":"uint160"}
                ]}]}]"#,
        )
        .unwrap();
        let defs = functions_from_abi_json(&abi);
        assert_eq!(defs.len(), 1);
        assert_eq!(
            defs[0].signature,
            "exactInputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))"
        );
        assert_eq!(defs[0].selector, "0x414bf389");
    }
}
