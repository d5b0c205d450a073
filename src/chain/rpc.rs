use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug)]
pub enum RpcError {
    HttpTimeout(String),
    HttpTransport(String),
    Json(String),
    Parse(String),
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::HttpTimeout(e) => write!(f, "rpc timeout: {e}"),
            RpcError::HttpTransport(e) => write!(f, "rpc transport error: {e}"),
            RpcError::Json(e) => write!(f, "rpc response error: {e}"),
            RpcError::Parse(e) => write!(f, "rpc parse error: {e}"),
            RpcError::Rpc { code, message, .. } => write!(f, "rpc error {code}: {message}"),
        }
    }
}

#[derive(Clone)]
pub struct RpcClient {
    url: String,
    client: Client,
}

impl RpcClient {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { url, client }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let req = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::HttpTimeout(e.to_string())
                } else {
                    RpcError::HttpTransport(e.to_string())
                }
            })?;

        let v: Value = resp
            .json()
            .await
            .map_err(|e| RpcError::Json(e.to_string()))?;

        if let Some(err) = v.get("error") {
            let code = err.get("code").and_then(|x| x.as_i64()).unwrap_or(-1);
            let message = err
                .get("message")
                .and_then(|x| x.as_str())
                .unwrap_or("rpc error")
                .to_string();
            let data = match err.get("data") {
                Some(v) if v.is_string() => v.as_str().map(|s| s.to_string()),
                Some(v) => Some(v.to_string()),
                None => None,
            };

            return Err(RpcError::Rpc {
                code,
                message,
                data,
            });
        }

        let result = v
            .get("result")
            .ok_or_else(|| RpcError::Json("missing result".into()))?;
        serde_json::from_value::<T>(result.clone()).map_err(|e| RpcError::Json(e.to_string()))
    }

    pub async fn eth_get_storage_at(
        &self,
        address: &str,
        slot: &str,
    ) -> Result<String, RpcError> {
        self.call("eth_getStorageAt", json!([address, slot, "latest"]))
            .await
    }

    pub async fn eth_get_transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<OnchainTransaction>, RpcError> {
        self.call("eth_getTransactionByHash", json!([tx_hash])).await
    }
}

// eth_getTransactionByHash result, reduced to the fields payment
// verification inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct OnchainTransaction {
    pub hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
}
