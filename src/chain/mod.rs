pub mod rpc;

use crate::registry;
use crate::util;
use rpc::{OnchainTransaction, RpcClient, RpcError};
use std::time::Duration;
use tokio::time;

/// Read-only chain access. One client per chain, constructed on demand
/// from the public RPC table.
#[derive(Clone)]
pub struct ChainClient {
    rpc: RpcClient,
    timeout_ms: u64,
}

impl ChainClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc: RpcClient::new(rpc_url),
            timeout_ms: 8_000,
        }
    }

    pub fn for_chain(chain_id: u64) -> Option<Self> {
        registry::public_rpc_url(chain_id).map(|url| Self::new(url.to_string()))
    }

    /// EIP-1967 style storage probe: the word at `slot` for the latest
    /// block. Used to read a proxy's singleton out of slot 0.
    pub async fn storage_word(&self, address: &str, slot: &str) -> Result<String, RpcError> {
        let budget = Duration::from_millis(self.timeout_ms.max(1));
        match time::timeout(budget, self.rpc.eth_get_storage_at(address, slot)).await {
            Ok(res) => res,
            Err(_) => Err(RpcError::HttpTimeout(format!(
                "eth_getStorageAt timeout budget exceeded ({}ms)",
                self.timeout_ms
            ))),
        }
    }

    /// The singleton address stored in slot 0 of a Safe proxy, or None
    /// when the slot is empty or unreadable.
    pub async fn proxy_singleton(&self, address: &str) -> Option<String> {
        let word = self.storage_word(address, "0x0").await.ok()?;
        let s = util::strip_0x(&word);
        if s.len() < 40 || s.chars().all(|c| c == '0') {
            return None;
        }
        Some(format!("0x{}", &s[s.len() - 40..]).to_lowercase())
    }

    pub async fn transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<OnchainTransaction>, RpcError> {
        let budget = Duration::from_millis(self.timeout_ms.max(1));
        match time::timeout(budget, self.rpc.eth_get_transaction_by_hash(tx_hash)).await {
            Ok(res) => res,
            Err(_) => Err(RpcError::HttpTimeout(format!(
                "eth_getTransactionByHash timeout budget exceeded ({}ms)",
                self.timeout_ms
            ))),
        }
    }
}
