//! Templated natural-language explanations. The action type is derived
//! from the decoded function name, then a per-action formatter turns
//! the decoded call and its simulation into a summary, detail bullets,
//! and warnings.

use crate::domain::{DecodedTransaction, ExplanationResult, Provenance, SimulationResult};
use crate::registry;
use crate::util;

pub fn explain(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    match detect_action_type(decoded) {
        "approve" => explain_approve(decoded, sim),
        "transfer" => explain_transfer(decoded, sim),
        "swap" => explain_swap(decoded, sim),
        "supply" => explain_supply(decoded, sim),
        "withdraw" => explain_withdraw(decoded, sim),
        "borrow" => explain_borrow(decoded, sim),
        "repay" => explain_repay(decoded, sim),
        "native_transfer" => explain_native_transfer(sim),
        "safe_exec" => explain_safe_exec(decoded, sim),
        "multicall" => explain_multicall(decoded, sim),
        _ => explain_generic(decoded, sim),
    }
}

pub fn detect_action_type(decoded: &DecodedTransaction) -> &'static str {
    let name = decoded.function_name.to_lowercase();
    if decoded.is_safe_proxy && name.contains("exectransaction") {
        return "safe_exec";
    }
    if name.contains("approve") {
        "approve"
    } else if name == "transfer" || name == "transferfrom" {
        "transfer"
    } else if name.contains("swap") || name.contains("exactinput") || name.contains("exactoutput") {
        "swap"
    } else if name.contains("supply") || name.contains("deposit") {
        "supply"
    } else if name.contains("withdraw") || name.contains("redeem") {
        "withdraw"
    } else if name.contains("borrow") {
        "borrow"
    } else if name.contains("repay") {
        "repay"
    } else if name == "native transfer" || name.is_empty() {
        "native_transfer"
    } else if name.contains("multicall") {
        "multicall"
    } else {
        "unknown"
    }
}

fn param_value<'a>(decoded: &'a DecodedTransaction, names: &[&str]) -> Option<&'a str> {
    decoded
        .parameters
        .iter()
        .find(|p| names.contains(&p.name.as_str()))
        .map(|p| p.value.as_str())
}

fn sim_status(sim: &SimulationResult) -> String {
    if sim.success {
        "✅ Simulation succeeded".to_string()
    } else {
        "❌ Simulation failed".to_string()
    }
}

fn gas_line(sim: &SimulationResult) -> String {
    format!("Estimated gas: {} units", util::group_thousands(sim.gas_used))
}

fn explain_approve(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let spender = param_value(decoded, &["spender"]).unwrap_or("unknown address");
    let amount = param_value(decoded, &["amount", "value"]).unwrap_or("0");
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("unknown protocol");
    let is_unlimited =
        amount == registry::MAX_UINT256_DECIMAL || amount.contains("ffffffff");
    let token_name = match &decoded.protocol {
        Some(p) if p.category == "Token" => p.name.as_str(),
        _ => "token",
    };

    let mut warnings = Vec::new();
    if is_unlimited {
        warnings.push(
            "⚠️ UNLIMITED APPROVAL: Authorizes spending an unlimited amount of tokens. \
             Consider approving only the needed amount."
                .to_string(),
        );
    }

    ExplanationResult {
        summary: format!(
            "Authorize {} to spend {} {}",
            protocol,
            if is_unlimited {
                "an unlimited amount of"
            } else {
                amount
            },
            token_name
        ),
        details: vec![
            format!(
                "Authorizes address {} to spend tokens on your behalf",
                describe_address(spender)
            ),
            format!(
                "Authorized amount: {}",
                if is_unlimited {
                    "∞ (unlimited)".to_string()
                } else {
                    describe_amount(amount)
                }
            ),
            match &decoded.protocol {
                Some(p) => format!("Detected protocol: {} ({})", p.name, p.category),
                None => "Protocol not identified".to_string(),
            },
            sim_status(sim),
        ],
        warnings,
        action_type: "approve".to_string(),
    }
}

fn explain_transfer(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let to = param_value(decoded, &["to"]).unwrap_or("unknown address");
    let amount = param_value(decoded, &["amount", "value"]).unwrap_or("0");
    let change = sim.balance_changes.first();
    let token_symbol = change.map(|c| c.token.symbol.as_str()).unwrap_or("tokens");
    let usd_value = change.map(|c| c.delta_usd.as_str()).unwrap_or("0");

    let mut details = vec![
        format!("Destination: {}", describe_address(to)),
        format!("Amount: {} {token_symbol}", describe_amount(amount)),
    ];
    if usd_value != "0" {
        let usd = usd_value.parse::<f64>().unwrap_or(0.0).abs();
        details.push(format!("Estimated value: ${usd:.2} USD"));
    }
    details.push(gas_line(sim));
    details.push(sim_status(sim));

    let mut warnings = Vec::new();
    if is_zero_address(to) {
        warnings.push(
            "⚠️ Destination is the zero address. Tokens sent there are permanently lost."
                .to_string(),
        );
    }

    ExplanationResult {
        summary: format!("Transfer {amount} {token_symbol} to {}", shorten_address(to)),
        details,
        warnings,
        action_type: "transfer".to_string(),
    }
}

fn explain_swap(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let outgoing = sim.balance_changes.iter().find(|c| c.delta.starts_with('-'));
    let incoming = sim.balance_changes.iter().find(|c| c.delta.starts_with('+'));

    let from_token = outgoing.map(|c| c.token.symbol.as_str()).unwrap_or("TOKEN_A");
    let to_token = incoming.map(|c| c.token.symbol.as_str()).unwrap_or("TOKEN_B");
    let from_amount = outgoing
        .map(|c| c.delta.trim_start_matches('-').to_string())
        .unwrap_or_else(|| "?".to_string());
    let to_amount = incoming
        .map(|c| c.delta.trim_start_matches('+').to_string())
        .unwrap_or_else(|| "?".to_string());
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("unknown DEX");

    let send_usd = outgoing
        .map(|c| c.delta_usd.parse::<f64>().unwrap_or(0.0).abs())
        .filter(|usd| *usd > 0.0)
        .map(|usd| format!(" (~${usd:.2} USD)"))
        .unwrap_or_default();
    let recv_usd = incoming
        .map(|c| c.delta_usd.parse::<f64>().unwrap_or(0.0))
        .filter(|usd| *usd != 0.0)
        .map(|usd| format!(" (~${usd:.2} USD)"))
        .unwrap_or_default();

    ExplanationResult {
        summary: format!("Swap {from_amount} {from_token} for ~{to_amount} {to_token} on {protocol}"),
        details: vec![
            format!("You send: {from_amount} {from_token}{send_usd}"),
            format!("You receive: ~{to_amount} {to_token}{recv_usd}"),
            format!("Protocol: {protocol}"),
            gas_line(sim),
            sim_status(sim),
        ],
        warnings: Vec::new(),
        action_type: "swap".to_string(),
    }
}

fn explain_supply(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let asset = param_value(decoded, &["asset"]).unwrap_or("");
    let amount = param_value(decoded, &["amount", "assets"]).unwrap_or("0");
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("lending protocol");

    ExplanationResult {
        summary: format!("Deposit {amount} tokens into {protocol}"),
        details: vec![
            format!("Token: {}", describe_address(asset)),
            format!("Amount: {}", describe_amount(amount)),
            format!("Protocol: {protocol}"),
            "Deposited tokens will earn yield".to_string(),
            sim_status(sim),
        ],
        warnings: Vec::new(),
        action_type: "supply".to_string(),
    }
}

fn explain_withdraw(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let asset = param_value(decoded, &["asset"]).unwrap_or("");
    let amount = param_value(decoded, &["amount", "assets"]).unwrap_or("0");
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("lending protocol");

    ExplanationResult {
        summary: format!("Withdraw {amount} tokens from {protocol}"),
        details: vec![
            format!("Token: {}", describe_address(asset)),
            format!("Amount: {}", describe_amount(amount)),
            format!("Protocol: {protocol}"),
            sim_status(sim),
        ],
        warnings: Vec::new(),
        action_type: "withdraw".to_string(),
    }
}

fn explain_borrow(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let asset = param_value(decoded, &["asset"]).unwrap_or("");
    let amount = param_value(decoded, &["amount", "assets"]).unwrap_or("0");
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("lending protocol");
    let rate_type = match param_value(decoded, &["interestRateMode"]) {
        Some("1") => "stable rate",
        Some("2") => "variable rate",
        _ => "unknown rate",
    };

    ExplanationResult {
        summary: format!("Borrow {amount} tokens on {protocol} ({rate_type})"),
        details: vec![
            format!("Token: {}", describe_address(asset)),
            format!("Amount: {}", describe_amount(amount)),
            format!("Interest type: {rate_type}"),
            format!("Protocol: {protocol}"),
            "⚠️ This creates a debt that must be repaid with interest".to_string(),
            sim_status(sim),
        ],
        warnings: vec![
            "A debt position will be created. Make sure you have sufficient collateral."
                .to_string(),
        ],
        action_type: "borrow".to_string(),
    }
}

fn explain_repay(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let asset = param_value(decoded, &["asset"]).unwrap_or("");
    let amount = param_value(decoded, &["amount", "assets"]).unwrap_or("0");
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("lending protocol");

    ExplanationResult {
        summary: format!("Repay {amount} tokens of debt on {protocol}"),
        details: vec![
            format!("Token: {}", describe_address(asset)),
            format!("Amount: {}", describe_amount(amount)),
            format!("Protocol: {protocol}"),
            "Reduces an outstanding borrow position".to_string(),
            sim_status(sim),
        ],
        warnings: Vec::new(),
        action_type: "repay".to_string(),
    }
}

fn explain_native_transfer(sim: &SimulationResult) -> ExplanationResult {
    let outgoing = sim.balance_changes.iter().find(|c| c.delta.starts_with('-'));
    let incoming = sim.balance_changes.iter().find(|c| c.delta.starts_with('+'));
    let amount = outgoing
        .map(|c| c.delta.trim_start_matches('-').to_string())
        .unwrap_or_else(|| "0".to_string());
    let to = incoming.map(|c| c.address.as_str()).unwrap_or("unknown address");

    let mut details = vec![
        format!("Destination: {}", describe_address(to)),
        format!("Amount: {amount} ETH"),
    ];
    if let Some(c) = outgoing {
        let usd = c.delta_usd.parse::<f64>().unwrap_or(0.0).abs();
        if usd > 0.0 {
            details.push(format!("Value: ~${usd:.2} USD"));
        }
    }
    details.push(sim_status(sim));

    ExplanationResult {
        summary: format!("Send {amount} ETH to {}", shorten_address(to)),
        details,
        warnings: Vec::new(),
        action_type: "native_transfer".to_string(),
    }
}

fn explain_safe_exec(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let mut details = vec!["Safe execution entry point (execTransaction)".to_string()];
    let mut warnings = Vec::new();
    let summary = match &decoded.inner_transaction {
        Some(inner) => {
            details.push(format!("Inner call to: {}", describe_address(&inner.to)));
            let eth = inner.value.parse::<f64>().unwrap_or(0.0) / 1e18;
            details.push(format!("Inner value: {eth} ETH"));
            details.push(format!(
                "Inner data: {}",
                if inner.data.len() >= 10 {
                    &inner.data[..10]
                } else {
                    "0x"
                }
            ));
            let operation = if inner.operation == 1 {
                "DelegateCall"
            } else {
                "Call"
            };
            details.push(format!("Operation: {operation}"));
            if inner.operation == 1 {
                warnings.push(
                    "⚠️ DelegateCall operation. The inner contract executes with the Safe's \
                     full authority."
                        .to_string(),
                );
            }
            format!(
                "Execute a Safe multisig transaction calling {}",
                shorten_address(&inner.to)
            )
        }
        None => "Execute a Safe multisig transaction".to_string(),
    };
    details.push(sim_status(sim));

    ExplanationResult {
        summary,
        details,
        warnings,
        action_type: "safe_exec".to_string(),
    }
}

fn explain_multicall(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("unknown protocol");

    ExplanationResult {
        summary: format!("Execute a batched multicall on {protocol}"),
        details: vec![
            format!("Function: {}", decoded.function_signature),
            format!("Protocol: {protocol}"),
            "Bundles several calls into one transaction; each inner call carries its own risk"
                .to_string(),
            gas_line(sim),
            sim_status(sim),
        ],
        warnings: Vec::new(),
        action_type: "multicall".to_string(),
    }
}

fn explain_generic(decoded: &DecodedTransaction, sim: &SimulationResult) -> ExplanationResult {
    let protocol = decoded.protocol.as_ref().map(|p| p.name.as_str());
    let params: Vec<String> = decoded
        .parameters
        .iter()
        .map(|p| {
            format!(
                "  • {} ({}): {}",
                p.label.as_deref().unwrap_or(&p.name),
                p.param_type,
                shorten_value(&p.value)
            )
        })
        .collect();

    ExplanationResult {
        summary: format!(
            "Execute function \"{}\"{}",
            decoded.function_name,
            protocol.map(|p| format!(" on {p}")).unwrap_or_default()
        ),
        details: vec![
            format!(
                "Function: {}",
                if decoded.function_signature.is_empty() {
                    &decoded.function_name
                } else {
                    &decoded.function_signature
                }
            ),
            protocol
                .map(|p| format!("Protocol: {p}"))
                .unwrap_or_else(|| "Protocol not identified".to_string()),
            if params.is_empty() {
                "No parameters".to_string()
            } else {
                format!("Parameters:\n{}", params.join("\n"))
            },
            gas_line(sim),
            if sim.balance_changes.is_empty() {
                "No balance changes detected".to_string()
            } else {
                format!(
                    "Balance changes: {}",
                    sim.balance_changes
                        .iter()
                        .map(|c| format!("{} {}", c.delta, c.token.symbol))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            },
            sim_status(sim),
        ],
        warnings: generic_warnings(decoded),
        action_type: "unknown".to_string(),
    }
}

/// Warning tier for unrecognized calls: unknown name and unverified
/// source compound into progressively stronger messaging.
fn generic_warnings(decoded: &DecodedTransaction) -> Vec<String> {
    let unknown_name = decoded.function_name.starts_with("Unknown")
        || decoded.function_source == Provenance::Raw;
    if !decoded.contract_verified && unknown_name {
        vec![
            "⚠️ Unknown function on an unverified contract. Cannot determine what this \
             transaction does."
                .to_string(),
        ]
    } else if !decoded.contract_verified && decoded.function_source == Provenance::FourByte {
        vec![
            "⚠️ This contract is not verified on Etherscan. The function name comes from a \
             public signature directory and may be inaccurate."
                .to_string(),
        ]
    } else if !decoded.contract_verified {
        vec!["⚠️ This contract is not verified on Etherscan".to_string()]
    } else if unknown_name {
        vec!["Function not recognized, but the contract source is verified.".to_string()]
    } else {
        Vec::new()
    }
}

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// past this the raw integer stops being readable
const UNITS_ESTIMATE_FLOOR: u128 = 1_000_000_000_000_000;

fn is_zero_address(addr: &str) -> bool {
    addr.eq_ignore_ascii_case(ZERO_ADDRESS)
}

fn shorten_address(addr: &str) -> String {
    util::truncate_address(addr)
}

/// Truncated form plus an explorer link. The zero address is named
/// instead of linked.
fn describe_address(addr: &str) -> String {
    if is_zero_address(addr) {
        return "the zero address (0x0000...0000)".to_string();
    }
    if !util::is_address(addr) {
        return addr.to_string();
    }
    format!(
        "{} (https://etherscan.io/address/{addr})",
        util::truncate_address(addr)
    )
}

/// Raw integer plus an 18-decimal estimate for large token amounts.
fn describe_amount(amount: &str) -> String {
    match amount.parse::<u128>() {
        Ok(v) if v > UNITS_ESTIMATE_FLOOR => {
            format!("{amount} (~{} at 18 decimals)", util::format_units18_u128(v))
        }
        _ => amount.to_string(),
    }
}

fn shorten_value(value: &str) -> String {
    if value.len() <= 20 {
        return value.to_string();
    }
    if value.starts_with("0x") {
        return format!("{}...{}", &value[..10], &value[value.len() - 8..]);
    }
    format!("{}...", &value[..16])
}
