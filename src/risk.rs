//! Heuristic risk scoring. Aggregates decode, simulation, and static
//! registry signals into an ordered list of reasons and a traffic-light
//! score: red if any red reason, else yellow if any yellow, else green.

use crate::domain::{RiskDetails, RiskLevel, RiskReason, RiskRequest, RiskResult};
use crate::registry;

pub fn assess(req: &RiskRequest) -> RiskResult {
    let mut reasons: Vec<RiskReason> = Vec::new();

    let protocol = registry::known_protocol(&req.to);
    let is_known = protocol.is_some();

    let data = req.data.as_deref().unwrap_or("");
    let selector = if data.len() >= 10 { &data[..10] } else { "0x" };
    let is_approval = selector.eq_ignore_ascii_case(registry::APPROVE_SELECTOR);
    let is_unlimited_approval = registry::is_unlimited_approval(data, req.decoded.as_ref());

    let is_unknown_function = req
        .decoded
        .as_ref()
        .map(|d| {
            d.function_name.starts_with("Unknown")
                || d.function_source == crate::domain::Provenance::Raw
        })
        .unwrap_or(false);

    let is_unverified = req.contract_verified == Some(false)
        || req
            .decoded
            .as_ref()
            .map(|d| !d.contract_verified)
            .unwrap_or(false);

    // red flags

    if is_unlimited_approval {
        reasons.push(reason(
            RiskLevel::Red,
            "UNLIMITED_APPROVAL",
            "Unlimited token approval detected. The spender can drain all tokens of this type.",
        ));
    }

    if is_unverified && !is_known && is_unknown_function {
        reasons.push(reason(
            RiskLevel::Red,
            "UNVERIFIED_UNKNOWN",
            "Unverified contract calling an unknown function. Cannot determine what this \
             transaction does. HIGH RISK.",
        ));
    } else if is_unverified && !is_known {
        reasons.push(reason(
            RiskLevel::Red,
            "UNVERIFIED_CONTRACT",
            "Contract is not verified on block explorer. Cannot inspect source code.",
        ));
    }

    if is_unknown_function && !is_unverified {
        reasons.push(reason(
            RiskLevel::Yellow,
            "UNKNOWN_FUNCTION",
            "Function could not be identified. The calldata does not match any known function \
             signature.",
        ));
    }

    if let Some(age) = req.contract_age {
        if age < registry::NEW_CONTRACT_THRESHOLD_DAYS {
            reasons.push(reason(
                RiskLevel::Red,
                "NEW_CONTRACT",
                format!("Contract deployed {age} day(s) ago. Very new contracts are higher risk."),
            ));
        }
    }

    if let Some(simulation) = &req.simulation {
        if !simulation.success {
            reasons.push(reason(
                RiskLevel::Red,
                "SIMULATION_FAILED",
                "Transaction simulation failed. The transaction would likely revert on-chain.",
            ));
        }
    }

    if let Some(decoded) = &req.decoded {
        if !decoded.is_safe_proxy
            && is_unverified
            && !is_known
            && decoded.function_source == crate::domain::Provenance::FourByte
        {
            reasons.push(reason(
                RiskLevel::Yellow,
                "FUNCTION_FROM_4BYTE",
                "Function name found in signature database but NOT from verified source code. \
                 Name may not be accurate.",
            ));
        }
    }

    // yellow flags

    let transfer_value_usd = estimate_transfer_value_usd(req);
    if transfer_value_usd > registry::LARGE_TRANSFER_THRESHOLD_USD {
        reasons.push(reason(
            RiskLevel::Yellow,
            "LARGE_TRANSFER",
            format!(
                "Large transfer detected: ~${} USD",
                format_grouped(transfer_value_usd)
            ),
        ));
    }

    if !is_known && !is_approval && !is_unverified {
        reasons.push(reason(
            RiskLevel::Yellow,
            "UNKNOWN_PROTOCOL",
            "Contract is not a recognized protocol. Proceed with caution.",
        ));
    }

    if is_approval && !is_unlimited_approval && !is_known {
        reasons.push(reason(
            RiskLevel::Yellow,
            "APPROVAL_UNKNOWN_SPENDER",
            "Token approval to an unrecognized contract.",
        ));
    }

    if let Some(simulation) = &req.simulation {
        if simulation.gas_used > registry::HIGH_GAS_THRESHOLD {
            reasons.push(reason(
                RiskLevel::Yellow,
                "HIGH_GAS",
                format!(
                    "High gas usage ({}). Complex transaction.",
                    format_grouped(simulation.gas_used as f64)
                ),
            ));
        }
    }

    // green signals

    if let Some(info) = &protocol {
        reasons.push(reason(
            RiskLevel::Green,
            "KNOWN_PROTOCOL",
            format!("Recognized protocol: {} ({})", info.name, info.category),
        ));
    }

    let verified = req.contract_verified == Some(true)
        || req
            .decoded
            .as_ref()
            .map(|d| d.contract_verified)
            .unwrap_or(false);
    if verified {
        reasons.push(reason(
            RiskLevel::Green,
            "VERIFIED_CONTRACT",
            "Contract source code is verified on block explorer.",
        ));
    }

    if req.decoded.as_ref().map(|d| d.is_safe_proxy).unwrap_or(false) {
        reasons.push(reason(
            RiskLevel::Green,
            "SAFE_PROXY",
            "Target is a Safe multisig wallet.",
        ));
    }

    let sim_ok = req.simulation.as_ref().map(|s| s.success).unwrap_or(false);
    if sim_ok && reasons.iter().all(|r| r.level != RiskLevel::Red) {
        reasons.push(reason(
            RiskLevel::Green,
            "SIMULATION_OK",
            "Transaction simulation succeeded.",
        ));
    }

    let score = overall_score(&reasons);
    let contract_verified = req
        .contract_verified
        .or_else(|| req.decoded.as_ref().map(|d| d.contract_verified));

    RiskResult {
        score,
        reasons,
        details: RiskDetails {
            contract_age: req.contract_age,
            contract_verified,
            is_known_protocol: is_known,
            protocol_name: protocol.map(|p| p.name),
            transfer_value_usd: Some(transfer_value_usd),
            is_unlimited_approval,
        },
    }
}

fn reason(level: RiskLevel, code: &str, message: impl Into<String>) -> RiskReason {
    RiskReason {
        level,
        code: code.to_string(),
        message: message.into(),
    }
}

/// Largest absolute USD delta from simulation, else a stale-price ETH
/// estimate from the native value.
fn estimate_transfer_value_usd(req: &RiskRequest) -> f64 {
    if let Some(simulation) = &req.simulation {
        let max_usd = simulation
            .balance_changes
            .iter()
            .map(|c| c.delta_usd.parse::<f64>().unwrap_or(0.0).abs())
            .fold(0.0f64, f64::max);
        if max_usd > 0.0 {
            return max_usd;
        }
    }
    if let Some(value) = &req.value {
        if !value.is_empty() && value != "0" {
            let eth = crate::util::parse_wei(value) as f64 / 1e18;
            return eth * registry::ETH_USD_FALLBACK;
        }
    }
    0.0
}

fn overall_score(reasons: &[RiskReason]) -> RiskLevel {
    if reasons.iter().any(|r| r.level == RiskLevel::Red) {
        RiskLevel::Red
    } else if reasons.iter().any(|r| r.level == RiskLevel::Yellow) {
        RiskLevel::Yellow
    } else {
        RiskLevel::Green
    }
}

/// Thousands-grouped rendering, up to three fraction digits.
fn format_grouped(v: f64) -> String {
    let negative = v < 0.0;
    let v = v.abs();
    let mut grouped = crate::util::group_thousands(v.trunc() as u64);
    let frac = v.fract();
    if frac > 0.0005 {
        let frac_str = format!("{:.3}", frac);
        let frac_trimmed = frac_str[2..].trim_end_matches('0');
        if !frac_trimmed.is_empty() {
            grouped = format!("{grouped}.{frac_trimmed}");
        }
    }
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DecodedTransaction, Provenance, SimulationResult,
    };

    fn base_request() -> RiskRequest {
        RiskRequest {
            to: "0x1234567890123456789012345678901234567890".to_string(),
            value: Some("0".to_string()),
            data: Some("0x".to_string()),
            chain_id: Some(1),
            decoded: None,
            simulation: None,
            contract_age: None,
            contract_verified: None,
        }
    }

    fn decoded(name: &str, verified: bool, source: Provenance) -> DecodedTransaction {
        DecodedTransaction {
            function_name: name.to_string(),
            function_signature: String::new(),
            parameters: Vec::new(),
            protocol: None,
            contract_verified: verified,
            function_source: source,
            is_safe_proxy: false,
            inner_transaction: None,
        }
    }

    fn ok_simulation() -> SimulationResult {
        SimulationResult {
            success: true,
            gas_used: 50_000,
            gas_limit: 60_000,
            balance_changes: Vec::new(),
            events: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn unlimited_approval_scores_red() {
        let mut req = base_request();
        req.data = Some(format!("0x095ea7b3{}{}", "0".repeat(64), "f".repeat(64)));
        let result = assess(&req);
        assert_eq!(result.score, RiskLevel::Red);
        assert!(result.reasons.iter().any(|r| r.code == "UNLIMITED_APPROVAL"));
        assert!(result.details.is_unlimited_approval);
    }

    #[test]
    fn unverified_unknown_is_red() {
        let mut req = base_request();
        req.contract_verified = Some(false);
        req.decoded = Some(decoded("Unknown (0xdeadbeef)", false, Provenance::Raw));
        let result = assess(&req);
        assert_eq!(result.score, RiskLevel::Red);
        assert!(result.reasons.iter().any(|r| r.code == "UNVERIFIED_UNKNOWN"));
        // the else-if arm must not also fire
        assert!(!result.reasons.iter().any(|r| r.code == "UNVERIFIED_CONTRACT"));
    }

    #[test]
    fn red_overrides_green_signals() {
        let mut req = base_request();
        req.to = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string();
        req.contract_verified = Some(true);
        req.contract_age = Some(2);
        req.simulation = Some(ok_simulation());
        let result = assess(&req);
        assert_eq!(result.score, RiskLevel::Red);
        assert!(result.reasons.iter().any(|r| r.code == "NEW_CONTRACT"));
        assert!(result.reasons.iter().any(|r| r.code == "KNOWN_PROTOCOL"));
        // SIMULATION_OK is withheld once any red reason exists
        assert!(!result.reasons.iter().any(|r| r.code == "SIMULATION_OK"));
    }

    #[test]
    fn known_protocol_verified_sim_ok_is_green() {
        let mut req = base_request();
        req.to = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string();
        req.contract_verified = Some(true);
        req.decoded = Some(decoded("swapExactTokensForTokens", true, Provenance::Local));
        req.simulation = Some(ok_simulation());
        let result = assess(&req);
        assert_eq!(result.score, RiskLevel::Green);
        assert!(result.reasons.iter().any(|r| r.code == "SIMULATION_OK"));
        assert_eq!(result.details.protocol_name.as_deref(), Some("Uniswap V2 Router"));
    }

    #[test]
    fn large_native_value_is_yellow() {
        let mut req = base_request();
        req.to = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string();
        req.contract_verified = Some(true);
        // 5 ETH * 3200 = $16,000
        req.value = Some("5000000000000000000".to_string());
        let result = assess(&req);
        assert_eq!(result.score, RiskLevel::Yellow);
        let large = result
            .reasons
            .iter()
            .find(|r| r.code == "LARGE_TRANSFER")
            .unwrap();
        assert!(large.message.contains("~$16,000 USD"));
    }

    #[test]
    fn high_gas_is_flagged() {
        let mut req = base_request();
        req.contract_verified = Some(true);
        let mut sim = ok_simulation();
        sim.gas_used = 750_000;
        req.simulation = Some(sim);
        let result = assess(&req);
        assert!(result.reasons.iter().any(|r| r.code == "HIGH_GAS"));
        assert_eq!(result.score, RiskLevel::Yellow);
    }

    #[test]
    fn grouped_formatting() {
        assert_eq!(format_grouped(16_000.0), "16,000");
        assert_eq!(format_grouped(999.0), "999");
        assert_eq!(format_grouped(1_234_567.0), "1,234,567");
    }
}
