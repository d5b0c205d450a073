use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Decode ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    pub calldata: String,
    pub contract_address: String,
    pub chain_id: Option<u64>,
}

/// Which lookup produced the function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Local,
    Etherscan,
    Sourcify,
    #[serde(rename = "4byte")]
    FourByte,
    #[default]
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolInfo {
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// The inner call carried by a Safe `execTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InnerTransaction {
    pub to: String,
    pub value: String,
    pub data: String,
    pub operation: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTransaction {
    pub function_name: String,
    pub function_signature: String,
    pub parameters: Vec<DecodedParameter>,
    pub protocol: Option<ProtocolInfo>,
    pub contract_verified: bool,
    #[serde(default)]
    pub function_source: Provenance,
    #[serde(default)]
    pub is_safe_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_transaction: Option<InnerTransaction>,
}

// ── Simulation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub to: String,
    pub value: String,
    pub data: String,
    pub chain_id: Option<u64>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub address: String,
    pub token: TokenInfo,
    pub before: String,
    pub after: String,
    pub delta: String,
    pub delta_usd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub address: String,
    pub name: String,
    pub params: BTreeMap<String, String>,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub success: bool,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub balance_changes: Vec<BalanceChange>,
    pub events: Vec<SimulationEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Policies ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicySeverity {
    Low,
    Medium,
    Warning,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    pub policy_id: String,
    pub name: String,
    pub severity: PolicySeverity,
    pub triggered: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub to: String,
    pub data: String,
    pub value: String,
    #[serde(default)]
    pub decoded: Option<DecodedTransaction>,
}

// ── Risk ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReason {
    pub level: RiskLevel,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_age: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_verified: Option<bool>,
    pub is_known_protocol: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_value_usd: Option<f64>,
    pub is_unlimited_approval: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRequest {
    pub to: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub decoded: Option<DecodedTransaction>,
    #[serde(default)]
    pub simulation: Option<SimulationResult>,
    /// Days since deployment, when the caller knows it.
    #[serde(default)]
    pub contract_age: Option<u64>,
    #[serde(default)]
    pub contract_verified: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskResult {
    pub score: RiskLevel,
    pub reasons: Vec<RiskReason>,
    pub details: RiskDetails,
}

// ── Explain ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationResult {
    pub summary: String,
    pub details: Vec<String>,
    pub warnings: Vec<String>,
    pub action_type: String,
}

// ── Safe Transaction Service ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SafeConfirmation {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub submission_date: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SafeTransaction {
    #[serde(default)]
    pub safe: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub operation: u8,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub submission_date: String,
    #[serde(default)]
    pub safe_tx_hash: String,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub confirmations_required: u64,
    #[serde(default)]
    pub confirmations: Vec<SafeConfirmation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SafeTransactionsResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub results: Vec<SafeTransaction>,
}

/// One pending transaction with the full analysis attached, as returned
/// by the poll endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTransaction {
    pub safe_tx_hash: String,
    pub nonce: u64,
    pub to: String,
    pub value: String,
    pub data: String,
    pub confirmations: u64,
    pub confirmations_required: u64,
    pub is_executed: bool,
    pub submission_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<DecodedTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskResult>,
    pub summary: String,
}
