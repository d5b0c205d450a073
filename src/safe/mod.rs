//! Safe Transaction Service client and the enriched poll pipeline.

use crate::decode::Decoder;
use crate::domain::{
    DecodeRequest, EnrichedTransaction, RiskLevel, RiskRequest, SafeTransaction,
    SafeTransactionsResponse, SimulationRequest,
};
use crate::registry;
use crate::risk;
use crate::simulate::Simulator;
use crate::util;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

const POLL_MAX_TXS: usize = 10;

#[derive(Debug)]
pub enum SafeError {
    UnsupportedChain(u64),
    NotFound(String),
    Service(String),
}

impl std::fmt::Display for SafeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafeError::UnsupportedChain(id) => {
                write!(f, "Unsupported chain ID: {id}. Supported: 1, 8453, 10, 42161, 137")
            }
            SafeError::NotFound(msg) => write!(f, "{msg}"),
            SafeError::Service(msg) => {
                write!(f, "Failed to fetch transactions from Safe Transaction Service: {msg}")
            }
        }
    }
}

#[derive(Clone)]
pub struct SafeClient {
    http: Client,
}

impl SafeClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http }
    }

    fn base_url(chain_id: u64) -> Result<&'static str, SafeError> {
        registry::safe_tx_service_url(chain_id).ok_or(SafeError::UnsupportedChain(chain_id))
    }

    /// Queued (not yet executed) transactions, newest nonce first, with
    /// superseded nonces filtered out best-effort.
    pub async fn pending_transactions(
        &self,
        safe_address: &str,
        chain_id: u64,
    ) -> Result<SafeTransactionsResponse, SafeError> {
        let base = Self::base_url(chain_id)?;
        let address = util::checksum_address(safe_address);
        let url = format!(
            "{base}/api/v1/safes/{address}/multisig-transactions/?executed=false&ordering=-nonce&limit=20"
        );

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SafeError::Service(e.to_string()))?;
        if resp.status().as_u16() == 404 {
            return Err(SafeError::NotFound(format!(
                "Safe not found: {safe_address} on chain {chain_id}"
            )));
        }
        if !resp.status().is_success() {
            return Err(SafeError::Service(format!(
                "Safe Transaction Service error: {}",
                resp.status()
            )));
        }
        let mut data: SafeTransactionsResponse = resp
            .json()
            .await
            .map_err(|e| SafeError::Service(e.to_string()))?;

        // A nonce already consumed by an executed transaction (often an
        // on-chain rejection) makes the queued one dead. When the
        // executed lookup fails we return the unfiltered list.
        if !data.results.is_empty() {
            let executed_url = format!(
                "{base}/api/v1/safes/{address}/multisig-transactions/?executed=true&ordering=-nonce&limit=5"
            );
            if let Ok(resp) = self
                .http
                .get(&executed_url)
                .header("Accept", "application/json")
                .send()
                .await
            {
                if resp.status().is_success() {
                    if let Ok(executed) = resp.json::<SafeTransactionsResponse>().await {
                        let executed_nonces: HashSet<u64> =
                            executed.results.iter().map(|tx| tx.nonce).collect();
                        data.results
                            .retain(|tx| !executed_nonces.contains(&tx.nonce));
                        data.count = data.results.len() as u64;
                    }
                }
            }
        }

        Ok(data)
    }

    /// All transactions for a Safe, executed included.
    pub async fn all_transactions(
        &self,
        safe_address: &str,
        chain_id: u64,
        limit: usize,
    ) -> Result<SafeTransactionsResponse, SafeError> {
        let base = Self::base_url(chain_id)?;
        let address = util::checksum_address(safe_address);
        let url = format!(
            "{base}/api/v1/safes/{address}/multisig-transactions/?ordering=-nonce&limit={limit}"
        );
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SafeError::Service(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SafeError::Service(format!(
                "Safe Transaction Service error: {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| SafeError::Service(e.to_string()))
    }

    /// Safe configuration (owners, threshold, version).
    pub async fn safe_info(&self, safe_address: &str, chain_id: u64) -> Result<Value, SafeError> {
        let base = Self::base_url(chain_id)?;
        let address = util::checksum_address(safe_address);
        let url = format!("{base}/api/v1/safes/{address}/");
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SafeError::Service(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SafeError::NotFound(format!(
                "Safe not found or service error: {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| SafeError::Service(e.to_string()))
    }
}

impl Default for SafeClient {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PollReport {
    pub count: usize,
    pub summary: String,
    pub transactions: Vec<EnrichedTransaction>,
}

/// Fetch pending transactions and run the full analysis pipeline over
/// each one. Per-transaction failures degrade to an error summary line
/// instead of failing the poll.
pub async fn poll(
    client: &SafeClient,
    decoder: &Decoder,
    simulator: &Simulator,
    safe_address: &str,
    chain_id: u64,
) -> Result<PollReport, SafeError> {
    let pending = client.pending_transactions(safe_address, chain_id).await?;

    if pending.count == 0 {
        return Ok(PollReport {
            count: 0,
            summary: "No pending transactions.".to_string(),
            transactions: Vec::new(),
        });
    }

    let mut enriched = Vec::new();
    for raw in pending.results.iter().take(POLL_MAX_TXS) {
        enriched.push(enrich_transaction(decoder, simulator, safe_address, chain_id, raw).await);
    }

    let red = count_score(&enriched, RiskLevel::Red);
    let yellow = count_score(&enriched, RiskLevel::Yellow);
    let green = count_score(&enriched, RiskLevel::Green);

    let mut summary = format!("📋 {} pending tx: ", enriched.len());
    if red > 0 {
        summary.push_str(&format!("🔴{red} danger "));
    }
    if yellow > 0 {
        summary.push_str(&format!("🟡{yellow} caution "));
    }
    if green > 0 {
        summary.push_str(&format!("🟢{green} ok"));
    }
    let summary = summary.trim_end().to_string();

    Ok(PollReport {
        count: enriched.len(),
        summary,
        transactions: enriched,
    })
}

async fn enrich_transaction(
    decoder: &Decoder,
    simulator: &Simulator,
    safe_address: &str,
    chain_id: u64,
    raw: &SafeTransaction,
) -> EnrichedTransaction {
    let data = raw.data.clone().unwrap_or_else(|| "0x".to_string());
    let mut tx = EnrichedTransaction {
        safe_tx_hash: raw.safe_tx_hash.clone(),
        nonce: raw.nonce,
        to: raw.to.clone(),
        value: raw.value.clone(),
        data: data.clone(),
        confirmations: raw.confirmations.len() as u64,
        confirmations_required: raw.confirmations_required,
        is_executed: raw.is_executed,
        submission_date: raw.submission_date.clone(),
        decoded: None,
        simulation: None,
        risk: None,
        summary: String::new(),
    };

    let decoded = decoder
        .decode(&DecodeRequest {
            calldata: data.clone(),
            contract_address: raw.to.clone(),
            chain_id: Some(chain_id),
        })
        .await;

    let simulation = simulator
        .simulate(&SimulationRequest {
            to: raw.to.clone(),
            value: raw.value.clone(),
            data: data.clone(),
            chain_id: Some(chain_id),
            from: Some(safe_address.to_string()),
        })
        .await;

    let risk_result = risk::assess(&RiskRequest {
        to: raw.to.clone(),
        value: Some(raw.value.clone()),
        data: Some(data),
        chain_id: Some(chain_id),
        decoded: Some(decoded.clone()),
        simulation: Some(simulation.clone()),
        contract_age: None,
        contract_verified: None,
    });

    let risk_emoji = match risk_result.score {
        RiskLevel::Green => "🟢",
        RiskLevel::Yellow => "🟡",
        RiskLevel::Red => "🔴",
    };
    let func_name = if decoded.function_name.is_empty() {
        "Unknown"
    } else {
        &decoded.function_name
    };
    let protocol = decoded
        .protocol
        .as_ref()
        .map(|p| format!(" ({})", p.name))
        .unwrap_or_default();
    let warnings = risk_result
        .reasons
        .iter()
        .filter(|r| r.level != RiskLevel::Green)
        .map(|r| r.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    tx.summary = format!(
        "{risk_emoji} #{}: {func_name}{protocol}{} [{}/{} signatures]",
        tx.nonce,
        if warnings.is_empty() {
            String::new()
        } else {
            format!(" — ⚠️ {warnings}")
        },
        tx.confirmations,
        tx.confirmations_required
    );
    tx.decoded = Some(decoded);
    tx.simulation = Some(simulation);
    tx.risk = Some(risk_result);

    if tx.confirmations_required == 0 {
        warn!(nonce = tx.nonce, "safe transaction reports zero required confirmations");
    }
    tx
}

fn count_score(txs: &[EnrichedTransaction], level: RiskLevel) -> usize {
    txs.iter()
        .filter(|t| t.risk.as_ref().map(|r| r.score == level).unwrap_or(false))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_chain_is_rejected() {
        let err = SafeClient::base_url(5).unwrap_err();
        assert!(matches!(err, SafeError::UnsupportedChain(5)));
        assert!(SafeClient::base_url(8453).is_ok());
    }

    #[tokio::test]
    async fn enrichment_summarizes_risk() {
        let decoder = Decoder::new(None);
        let simulator = Simulator::new(None);
        // target is a known Safe singleton so proxy detection resolves
        // from the static set without a chain read
        let raw = SafeTransaction {
            safe: "0x0000000000000000000000000000000000000002".to_string(),
            to: "0x41675C099F32341bf84BFc5382aF534df5C7461a".to_string(),
            value: "0".to_string(),
            data: Some(format!("0x095ea7b3{}{}", "0".repeat(64), "f".repeat(64))),
            operation: 0,
            nonce: 42,
            submission_date: "2026-08-01T00:00:00Z".to_string(),
            safe_tx_hash: "0xhash".to_string(),
            is_executed: false,
            confirmations_required: 2,
            confirmations: vec![Default::default()],
        };
        let tx = enrich_transaction(
            &decoder,
            &simulator,
            "0x0000000000000000000000000000000000000002",
            8453,
            &raw,
        )
        .await;
        assert!(tx.summary.starts_with("🔴 #42: approve"));
        assert!(tx.summary.contains("[1/2 signatures]"));
        assert!(tx.summary.contains("Unlimited token approval"));
        assert_eq!(
            tx.risk.as_ref().map(|r| r.score),
            Some(RiskLevel::Red)
        );
    }
}
