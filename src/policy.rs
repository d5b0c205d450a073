//! Stateless policy engine. Every evaluation returns the same five
//! results in the same order, triggered or not, so callers can render a
//! stable checklist.

use crate::domain::{PolicyRequest, PolicyResult, PolicySeverity};
use crate::registry;
use crate::util;

pub fn evaluate(tx: &PolicyRequest) -> Vec<PolicyResult> {
    vec![
        check_unlimited_approval(tx),
        check_ownership_transfer(tx),
        check_proxy_upgrade(tx),
        check_large_value(tx),
        check_malicious_signature(tx),
    ]
}

fn selector_of(data: &str) -> Option<String> {
    if data.len() < 10 {
        return None;
    }
    Some(data[..10].to_lowercase())
}

fn check_unlimited_approval(tx: &PolicyRequest) -> PolicyResult {
    let mut policy = PolicyResult {
        policy_id: "unlimited-approval".to_string(),
        name: "Unlimited Token Approval".to_string(),
        severity: PolicySeverity::High,
        triggered: false,
        message: "Transaction does not contain unlimited token approval".to_string(),
    };
    if registry::is_unlimited_approval(&tx.data, tx.decoded.as_ref()) {
        policy.triggered = true;
        policy.message = "CRITICAL: Unlimited token approval detected. Spender can drain all \
                          tokens of this type."
            .to_string();
    }
    policy
}

fn check_ownership_transfer(tx: &PolicyRequest) -> PolicyResult {
    let mut policy = PolicyResult {
        policy_id: "ownership-transfer".to_string(),
        name: "Ownership Transfer".to_string(),
        severity: PolicySeverity::High,
        triggered: false,
        message: "Transaction does not transfer ownership".to_string(),
    };
    let Some(selector) = selector_of(&tx.data) else {
        return policy;
    };
    if registry::is_ownership_transfer_selector(&selector) {
        policy.triggered = true;
        policy.message = match &tx.decoded {
            Some(decoded) => format!(
                "HIGH RISK: Ownership transfer detected via {}. This permanently changes \
                 contract control.",
                decoded.function_name
            ),
            None => "HIGH RISK: Ownership transfer function detected. This permanently changes \
                     contract control."
                .to_string(),
        };
    }
    policy
}

fn check_proxy_upgrade(tx: &PolicyRequest) -> PolicyResult {
    let mut policy = PolicyResult {
        policy_id: "proxy-upgrade".to_string(),
        name: "Proxy Upgrade".to_string(),
        severity: PolicySeverity::High,
        triggered: false,
        message: "Transaction does not upgrade proxy implementation".to_string(),
    };
    let Some(selector) = selector_of(&tx.data) else {
        return policy;
    };
    if registry::is_proxy_upgrade_selector(&selector) {
        policy.triggered = true;
        policy.message = match &tx.decoded {
            Some(decoded) => format!(
                "HIGH RISK: Proxy upgrade detected via {}. This changes the contract's \
                 implementation code.",
                decoded.function_name
            ),
            None => "HIGH RISK: Proxy upgrade function detected. This changes the contract's \
                     implementation code."
                .to_string(),
        };
    }
    policy
}

fn check_large_value(tx: &PolicyRequest) -> PolicyResult {
    let mut policy = PolicyResult {
        policy_id: "large-value".to_string(),
        name: "Large Value Transfer".to_string(),
        severity: PolicySeverity::Warning,
        triggered: false,
        message: "Transfer value is within normal range".to_string(),
    };
    if tx.value.is_empty() || tx.value == "0" {
        return policy;
    }
    let value_eth = util::parse_wei(&tx.value) as f64 / 1e18;
    if value_eth > registry::LARGE_VALUE_THRESHOLD_ETH {
        policy.triggered = true;
        policy.message = format!(
            "WARNING: Large value transfer detected: {:.4} ETH (>{} ETH threshold)",
            value_eth,
            registry::LARGE_VALUE_THRESHOLD_ETH as u64
        );
    }
    policy
}

fn check_malicious_signature(tx: &PolicyRequest) -> PolicyResult {
    let mut policy = PolicyResult {
        policy_id: "malicious-signature".to_string(),
        name: "Known Malicious Signature".to_string(),
        severity: PolicySeverity::Critical,
        triggered: false,
        message: "Function signature is not flagged as malicious".to_string(),
    };
    let Some(selector) = selector_of(&tx.data) else {
        return policy;
    };
    if registry::is_malicious_selector(&selector) {
        policy.triggered = true;
        policy.message = match &tx.decoded {
            Some(decoded) => format!(
                "CRITICAL: Known exploit signature detected: {} ({}). This pattern is commonly \
                 used in attacks.",
                decoded.function_name, selector
            ),
            None => format!(
                "CRITICAL: Known exploit signature detected: {selector}. This pattern is \
                 commonly used in attacks."
            ),
        };
    }
    policy
}
