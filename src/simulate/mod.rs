//! Transaction simulation. Uses Tenderly when credentials are
//! configured; otherwise (or on any Tenderly failure) falls back to a
//! deterministic mock keyed by the function selector, so downstream
//! risk and explanation logic always has something to work with.

use crate::domain::{
    BalanceChange, SimulationEvent, SimulationRequest, SimulationResult, TokenInfo,
};
use crate::registry;
use crate::util;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

const DEFAULT_FROM: &str = "0x0000000000000000000000000000000000000001";
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

const APPROVAL_TOPIC: &str =
    "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925";
const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
const SWAP_TOPIC: &str = "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822";

#[derive(Clone)]
pub struct TenderlyConfig {
    pub access_key: String,
    pub account: String,
    pub project: String,
}

#[derive(Clone)]
pub struct Simulator {
    http: Client,
    tenderly: Option<TenderlyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockScenario {
    Approve,
    Transfer,
    Swap,
    EthTransfer,
}

impl MockScenario {
    fn from_selector(selector: &str) -> Self {
        match selector {
            s if s.eq_ignore_ascii_case(registry::APPROVE_SELECTOR) => MockScenario::Approve,
            s if s.eq_ignore_ascii_case(registry::TRANSFER_SELECTOR) => MockScenario::Transfer,
            s if registry::is_swap_selector(&s.to_lowercase()) => MockScenario::Swap,
            _ => MockScenario::EthTransfer,
        }
    }
}

impl Simulator {
    pub fn new(tenderly: Option<TenderlyConfig>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { http, tenderly }
    }

    pub async fn simulate(&self, req: &SimulationRequest) -> SimulationResult {
        if let Some(cfg) = &self.tenderly {
            match self.simulate_with_tenderly(req, cfg).await {
                Ok(result) => return result,
                Err(err) => {
                    warn!(error = %err, "tenderly simulation failed, using mock");
                }
            }
        }
        mock_simulation(req)
    }

    async fn simulate_with_tenderly(
        &self,
        req: &SimulationRequest,
        cfg: &TenderlyConfig,
    ) -> Result<SimulationResult, String> {
        let url = format!(
            "https://api.tenderly.co/api/v1/account/{}/project/{}/simulate",
            cfg.account, cfg.project
        );
        let body = json!({
            "network_id": req.chain_id.unwrap_or(1).to_string(),
            "from": req.from.as_deref().unwrap_or(DEFAULT_FROM),
            "to": req.to,
            "input": req.data,
            "value": if req.value.is_empty() { "0" } else { &req.value },
            "save": false,
            "save_if_fails": false,
            "simulation_type": "full",
        });

        let resp = self
            .http
            .post(&url)
            .header("X-Access-Key", &cfg.access_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("tenderly api error: {status} - {text}"));
        }
        let data: Value = resp.json().await.map_err(|e| e.to_string())?;
        Ok(parse_tenderly_response(&data))
    }
}

fn parse_tenderly_response(data: &Value) -> SimulationResult {
    let tx = data.get("transaction");
    let mut balance_changes = Vec::new();
    let mut events = Vec::new();

    if let Some(changes) = tx
        .and_then(|t| t.pointer("/transaction_info/asset_changes"))
        .and_then(|c| c.as_array())
    {
        for change in changes {
            let str_of = |key: &str| {
                change
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let address = change
                .get("from")
                .and_then(|v| v.as_str())
                .or_else(|| change.get("to").and_then(|v| v.as_str()))
                .unwrap_or_default()
                .to_string();
            let token_info = change.get("token_info");
            let token_str = |key: &str, default: &str| {
                token_info
                    .and_then(|t| t.get(key))
                    .and_then(|v| v.as_str())
                    .unwrap_or(default)
                    .to_string()
            };
            balance_changes.push(BalanceChange {
                address,
                token: TokenInfo {
                    address: token_str("contract_address", ZERO_ADDRESS),
                    symbol: token_str("symbol", "UNKNOWN"),
                    name: token_str("name", "Unknown Token"),
                    decimals: token_info
                        .and_then(|t| t.get("decimals"))
                        .and_then(|v| v.as_u64())
                        .unwrap_or(18) as u32,
                },
                before: {
                    let raw = str_of("raw_amount");
                    if raw.is_empty() { "0".to_string() } else { raw }
                },
                after: "0".to_string(),
                delta: {
                    let amount = str_of("amount");
                    if amount.is_empty() { "0".to_string() } else { amount }
                },
                delta_usd: {
                    let usd = str_of("dollar_value");
                    if usd.is_empty() { "0".to_string() } else { usd }
                },
            });
        }
    }

    if let Some(logs) = tx
        .and_then(|t| t.pointer("/transaction_info/logs"))
        .and_then(|l| l.as_array())
    {
        for log in logs {
            let mut params = BTreeMap::new();
            if let Some(inputs) = log.get("inputs").and_then(|i| i.as_array()) {
                for inp in inputs {
                    let key = inp
                        .pointer("/soltype/name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("param")
                        .to_string();
                    let value = match inp.get("value") {
                        Some(Value::String(s)) => s.clone(),
                        Some(v) => v.to_string(),
                        None => String::new(),
                    };
                    params.insert(key, value);
                }
            }
            events.push(SimulationEvent {
                address: log
                    .pointer("/raw/address")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                name: log
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown")
                    .to_string(),
                params,
                topic: log
                    .pointer("/raw/topics/0")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    SimulationResult {
        success: tx
            .and_then(|t| t.get("status"))
            .and_then(|s| s.as_bool())
            .unwrap_or(false),
        gas_used: tx
            .and_then(|t| t.get("gas_used"))
            .and_then(|g| g.as_u64())
            .unwrap_or(0),
        gas_limit: tx
            .and_then(|t| t.get("gas"))
            .and_then(|g| g.as_u64())
            .unwrap_or(0),
        balance_changes,
        events,
        error: None,
    }
}

// ── Deterministic mock ──────────────────────────────────────────────

pub fn mock_simulation(req: &SimulationRequest) -> SimulationResult {
    let selector = if req.data.len() >= 10 {
        &req.data[..10]
    } else {
        "0x"
    };
    match MockScenario::from_selector(selector) {
        MockScenario::Approve => mock_approve(req),
        MockScenario::Transfer => mock_transfer(req),
        MockScenario::Swap => mock_swap(req),
        MockScenario::EthTransfer => mock_eth_transfer(req),
    }
}

fn sender_of(req: &SimulationRequest) -> String {
    req.from
        .clone()
        .unwrap_or_else(|| DEFAULT_FROM.to_string())
}

fn calldata_word_amount(data: &str) -> u128 {
    let trimmed = data.get(74..).unwrap_or("").trim_start_matches('0');
    if trimmed.is_empty() {
        return 0;
    }
    u128::from_str_radix(trimmed, 16).unwrap_or(u128::MAX)
}

fn mock_approve(req: &SimulationRequest) -> SimulationResult {
    let spender = format!(
        "0x{}",
        req.data.get(34..74).unwrap_or("0000000000000000000000000000000000000000")
    );
    let unlimited = registry::is_unlimited_approval(&req.data, None);
    let amount = calldata_word_amount(&req.data);

    let mut params = BTreeMap::new();
    params.insert("owner".to_string(), sender_of(req));
    params.insert("spender".to_string(), spender);
    params.insert(
        "value".to_string(),
        if unlimited {
            "UNLIMITED".to_string()
        } else {
            util::format_units18_u128(amount)
        },
    );

    SimulationResult {
        success: true,
        gas_used: 46_200,
        gas_limit: 60_000,
        balance_changes: Vec::new(),
        events: vec![SimulationEvent {
            address: req.to.clone(),
            name: "Approval".to_string(),
            params,
            topic: APPROVAL_TOPIC.to_string(),
        }],
        error: None,
    }
}

fn mock_transfer(req: &SimulationRequest) -> SimulationResult {
    let sender = sender_of(req);
    let recipient = format!(
        "0x{}",
        req.data.get(34..74).unwrap_or("0000000000000000000000000000000000000000")
    );
    let amount = calldata_word_amount(&req.data);
    let formatted = util::format_units18_u128(amount);
    let token = TokenInfo {
        address: req.to.clone(),
        symbol: "TOKEN".to_string(),
        name: "ERC20 Token".to_string(),
        decimals: 18,
    };

    let mut params = BTreeMap::new();
    params.insert("from".to_string(), sender.clone());
    params.insert("to".to_string(), recipient.clone());
    params.insert("value".to_string(), formatted.clone());

    SimulationResult {
        success: true,
        gas_used: 52_300,
        gas_limit: 65_000,
        balance_changes: vec![
            BalanceChange {
                address: sender.clone(),
                token: token.clone(),
                before: util::format_units18_u128(amount.saturating_mul(10)),
                after: util::format_units18_u128(amount.saturating_mul(9)),
                delta: format!("-{formatted}"),
                delta_usd: "-0.00".to_string(),
            },
            BalanceChange {
                address: recipient,
                token: token.clone(),
                before: "0".to_string(),
                after: formatted.clone(),
                delta: format!("+{formatted}"),
                delta_usd: "0.00".to_string(),
            },
        ],
        events: vec![SimulationEvent {
            address: req.to.clone(),
            name: "Transfer".to_string(),
            params,
            topic: TRANSFER_TOPIC.to_string(),
        }],
        error: None,
    }
}

fn mock_swap(req: &SimulationRequest) -> SimulationResult {
    let sender = sender_of(req);
    let usdc = TokenInfo {
        address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
        symbol: "USDC".to_string(),
        name: "USD Coin".to_string(),
        decimals: 6,
    };
    let weth = TokenInfo {
        address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
        symbol: "WETH".to_string(),
        name: "Wrapped Ether".to_string(),
        decimals: 18,
    };

    let mut out_params = BTreeMap::new();
    out_params.insert("from".to_string(), sender.clone());
    out_params.insert("to".to_string(), req.to.clone());
    out_params.insert("value".to_string(), "1000.00".to_string());

    let mut in_params = BTreeMap::new();
    in_params.insert("from".to_string(), req.to.clone());
    in_params.insert("to".to_string(), sender.clone());
    in_params.insert("value".to_string(), "0.312".to_string());

    let mut swap_params = BTreeMap::new();
    swap_params.insert("sender".to_string(), sender.clone());
    swap_params.insert("amount0In".to_string(), "1000000000".to_string());
    swap_params.insert("amount1In".to_string(), "0".to_string());
    swap_params.insert("amount0Out".to_string(), "0".to_string());
    swap_params.insert("amount1Out".to_string(), "312000000000000000".to_string());
    swap_params.insert("to".to_string(), sender.clone());

    SimulationResult {
        success: true,
        gas_used: 185_400,
        gas_limit: 250_000,
        balance_changes: vec![
            BalanceChange {
                address: sender.clone(),
                token: usdc.clone(),
                before: "10000.00".to_string(),
                after: "9000.00".to_string(),
                delta: "-1000.00".to_string(),
                delta_usd: "-1000.00".to_string(),
            },
            BalanceChange {
                address: sender.clone(),
                token: weth.clone(),
                before: "5.0".to_string(),
                after: "5.312".to_string(),
                delta: "+0.312".to_string(),
                delta_usd: "+1002.50".to_string(),
            },
        ],
        events: vec![
            SimulationEvent {
                address: usdc.address,
                name: "Transfer".to_string(),
                params: out_params,
                topic: TRANSFER_TOPIC.to_string(),
            },
            SimulationEvent {
                address: weth.address,
                name: "Transfer".to_string(),
                params: in_params,
                topic: TRANSFER_TOPIC.to_string(),
            },
            SimulationEvent {
                address: req.to.clone(),
                name: "Swap".to_string(),
                params: swap_params,
                topic: SWAP_TOPIC.to_string(),
            },
        ],
        error: None,
    }
}

fn mock_eth_transfer(req: &SimulationRequest) -> SimulationResult {
    let sender = sender_of(req);
    let wei = util::parse_wei(&req.value);
    let eth_str = util::format_units18_u128(wei);
    let eth = util::decimal_to_f64(&eth_str);
    let token = TokenInfo {
        address: ZERO_ADDRESS.to_string(),
        symbol: "ETH".to_string(),
        name: "Ether".to_string(),
        decimals: 18,
    };

    SimulationResult {
        success: true,
        gas_used: 21_000,
        gas_limit: 21_000,
        balance_changes: vec![
            BalanceChange {
                address: sender,
                token: token.clone(),
                before: "10.0".to_string(),
                after: format!("{:.6}", 10.0 - eth),
                delta: format!("-{eth_str}"),
                delta_usd: format!("-{:.2}", eth * registry::ETH_USD_FALLBACK),
            },
            BalanceChange {
                address: req.to.clone(),
                token,
                before: "0.5".to_string(),
                after: format!("{:.6}", 0.5 + eth),
                delta: format!("+{eth_str}"),
                delta_usd: format!("+{:.2}", eth * registry::ETH_USD_FALLBACK),
            },
        ],
        events: Vec::new(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(data: &str, value: &str) -> SimulationRequest {
        SimulationRequest {
            to: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
            value: value.to_string(),
            data: data.to_string(),
            chain_id: Some(1),
            from: None,
        }
    }

    #[test]
    fn approve_mock_reports_unlimited() {
        let data = format!("0x095ea7b3{}{}", "0".repeat(64), "f".repeat(64));
        let result = mock_simulation(&request(&data, "0"));
        assert!(result.success);
        assert_eq!(result.gas_used, 46_200);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].name, "Approval");
        assert_eq!(result.events[0].params.get("value").map(String::as_str), Some("UNLIMITED"));
    }

    #[test]
    fn transfer_mock_debits_and_credits() {
        // transfer of 1 token (1e18)
        let data = format!(
            "0xa9059cbb{:0>64}{:064x}",
            "1111111254eeb25477b68fb85ed929f73a960582", 1_000_000_000_000_000_000u128
        );
        let result = mock_simulation(&request(&data, "0"));
        assert_eq!(result.gas_used, 52_300);
        assert_eq!(result.balance_changes.len(), 2);
        assert_eq!(result.balance_changes[0].delta, "-1.0");
        assert_eq!(result.balance_changes[0].before, "10.0");
        assert_eq!(result.balance_changes[0].after, "9.0");
        assert_eq!(result.balance_changes[1].delta, "+1.0");
        assert_eq!(result.events[0].topic, TRANSFER_TOPIC);
    }

    #[test]
    fn swap_mock_produces_canned_pair() {
        let data = format!("0x38ed1739{}", "0".repeat(128));
        let result = mock_simulation(&request(&data, "0"));
        assert_eq!(result.gas_used, 185_400);
        assert_eq!(result.balance_changes[0].token.symbol, "USDC");
        assert_eq!(result.balance_changes[1].token.symbol, "WETH");
        assert_eq!(result.events.len(), 3);
    }

    #[test]
    fn plain_value_falls_back_to_eth_transfer() {
        let result = mock_simulation(&request("0x", "1000000000000000000"));
        assert_eq!(result.gas_used, 21_000);
        assert_eq!(result.balance_changes[0].delta, "-1.0");
        assert!(result.balance_changes[0].delta_usd.starts_with("-3200"));
        assert!(result.events.is_empty());
    }
}
