//! Calldata decoding with an ordered fallback chain: local known ABIs,
//! then block-explorer ABI, then Sourcify metadata, then the 4byte
//! signature directory, then a built-in ERC-20 selector table, and
//! finally a raw word-split heuristic. Decoding never fails; every
//! path degrades to the next one.

pub mod abi;

use crate::chain::ChainClient;
use crate::domain::{
    DecodeRequest, DecodedParameter, DecodedTransaction, InnerTransaction, Provenance,
};
use crate::registry;
use crate::util;
use abi::FunctionDef;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

// Known ABIs bundled for local decoding. ERC-20, the Uniswap routers,
// Aave V3, Morpho Blue, and the Safe execution entry point.
const LOCAL_ABIS: &[&str] = &[
    // ERC-20
    "function approve(address spender, uint256 amount) returns (bool)",
    "function transfer(address to, uint256 amount) returns (bool)",
    "function transferFrom(address from, address to, uint256 amount) returns (bool)",
    "function balanceOf(address account) view returns (uint256)",
    "function allowance(address owner, address spender) view returns (uint256)",
    "function totalSupply() view returns (uint256)",
    "function name() view returns (string)",
    "function symbol() view returns (string)",
    "function decimals() view returns (uint8)",
    // Uniswap V2 router
    "function swapExactTokensForTokens(uint amountIn, uint amountOutMin, address[] path, address to, uint deadline) returns (uint[] amounts)",
    "function swapTokensForExactTokens(uint amountOut, uint amountInMax, address[] path, address to, uint deadline) returns (uint[] amounts)",
    "function swapExactETHForTokens(uint amountOutMin, address[] path, address to, uint deadline) payable returns (uint[] amounts)",
    "function swapTokensForExactETH(uint amountOut, uint amountInMax, address[] path, address to, uint deadline) returns (uint[] amounts)",
    "function swapExactTokensForETH(uint amountIn, uint amountOutMin, address[] path, address to, uint deadline) returns (uint[] amounts)",
    "function addLiquidity(address tokenA, address tokenB, uint amountADesired, uint amountBDesired, uint amountAMin, uint amountBMin, address to, uint deadline) returns (uint amountA, uint amountB, uint liquidity)",
    "function removeLiquidity(address tokenA, address tokenB, uint liquidity, uint amountAMin, uint amountBMin, address to, uint deadline) returns (uint amountA, uint amountB)",
    // Uniswap V3 router
    "function exactInputSingle((address tokenIn, address tokenOut, uint24 fee, address recipient, uint256 deadline, uint256 amountIn, uint256 amountOutMinimum, uint160 sqrtPriceLimitX96)) payable returns (uint256 amountOut)",
    "function exactInput((bytes path, address recipient, uint256 deadline, uint256 amountIn, uint256 amountOutMinimum)) payable returns (uint256 amountOut)",
    "function multicall(uint256 deadline, bytes[] data) payable returns (bytes[] results)",
    "function multicall(bytes[] data) payable returns (bytes[] results)",
    // Aave V3 pool
    "function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode)",
    "function withdraw(address asset, uint256 amount, address to) returns (uint256)",
    "function borrow(address asset, uint256 amount, uint256 interestRateMode, uint16 referralCode, address onBehalfOf)",
    "function repay(address asset, uint256 amount, uint256 interestRateMode, address onBehalfOf) returns (uint256)",
    // Morpho Blue
    "function supply((address loanToken, address collateralToken, address oracle, address irm, uint256 lltv) marketParams, uint256 assets, uint256 shares, address onBehalf, bytes data) returns (uint256, uint256)",
    "function withdraw((address loanToken, address collateralToken, address oracle, address irm, uint256 lltv) marketParams, uint256 assets, uint256 shares, address onBehalf, address receiver) returns (uint256, uint256)",
    "function borrow((address loanToken, address collateralToken, address oracle, address irm, uint256 lltv) marketParams, uint256 assets, uint256 shares, address onBehalf, address receiver) returns (uint256, uint256)",
    "function repay((address loanToken, address collateralToken, address oracle, address irm, uint256 lltv) marketParams, uint256 assets, uint256 shares, address onBehalf, bytes data) returns (uint256, uint256)",
    "function supplyCollateral((address loanToken, address collateralToken, address oracle, address irm, uint256 lltv) marketParams, uint256 assets, address onBehalf, bytes data)",
    "function withdrawCollateral((address loanToken, address collateralToken, address oracle, address irm, uint256 lltv) marketParams, uint256 assets, address onBehalf, address receiver)",
    "function liquidate((address loanToken, address collateralToken, address oracle, address irm, uint256 lltv) marketParams, address borrower, uint256 seizedAssets, uint256 repaidShares, bytes data) returns (uint256, uint256)",
    "function flashLoan(address token, uint256 assets, bytes data)",
    "function setAuthorization(address authorized, bool newIsAuthorized)",
    // Safe
    "function execTransaction(address to, uint256 value, bytes data, uint8 operation, uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, address refundReceiver, bytes signatures) returns (bool)",
];

fn local_defs() -> &'static HashMap<String, FunctionDef> {
    static DEFS: OnceLock<HashMap<String, FunctionDef>> = OnceLock::new();
    DEFS.get_or_init(|| {
        let mut map = HashMap::new();
        for decl in LOCAL_ABIS {
            if let Some(def) = abi::parse_signature(decl) {
                map.entry(def.selector.clone()).or_insert(def);
            }
        }
        map
    })
}

/// One attempt in the decode fallback chain. `DECODE_CHAIN` fixes the
/// order attempts run in; the first step that yields a decode wins, and
/// `Raw` always yields one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStep {
    Local,
    Explorer,
    Sourcify,
    FourByte,
    Erc20Table,
    Raw,
}

pub const DECODE_CHAIN: &[DecodeStep] = &[
    DecodeStep::Local,
    DecodeStep::Explorer,
    DecodeStep::Sourcify,
    DecodeStep::FourByte,
    DecodeStep::Erc20Table,
    DecodeStep::Raw,
];

#[derive(Clone)]
pub struct Decoder {
    http: Client,
    etherscan_api_key: Option<String>,
}

impl Decoder {
    pub fn new(etherscan_api_key: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            http,
            etherscan_api_key,
        }
    }

    pub async fn decode(&self, req: &DecodeRequest) -> DecodedTransaction {
        let chain_id = req.chain_id.unwrap_or(1);
        let calldata = req.calldata.trim().to_lowercase();
        let protocol = registry::known_protocol(&req.contract_address);

        if calldata.is_empty() || calldata == "0x" || calldata.len() < 10 {
            return DecodedTransaction {
                function_name: "Native Transfer".to_string(),
                function_signature: String::new(),
                parameters: Vec::new(),
                protocol,
                contract_verified: false,
                function_source: Provenance::Raw,
                is_safe_proxy: false,
                inner_transaction: None,
            };
        }

        // Non-ASCII bytes break the slicing the chain relies on, and
        // the Safe service path feeds unvalidated data here.
        if !calldata.is_ascii() {
            return DecodedTransaction {
                function_name: "Unknown".to_string(),
                function_signature: String::new(),
                parameters: Vec::new(),
                protocol,
                contract_verified: false,
                function_source: Provenance::Raw,
                is_safe_proxy: false,
                inner_transaction: None,
            };
        }

        let selector = calldata[..10].to_string();
        let is_safe_proxy = self.detect_safe_proxy(&req.contract_address, chain_id).await;

        let mut decoded = self
            .run_chain(&calldata, &selector, &req.contract_address, chain_id, protocol)
            .await;

        decoded.is_safe_proxy = is_safe_proxy;
        if is_safe_proxy && selector == registry::EXEC_TRANSACTION_SELECTOR {
            decoded.inner_transaction = unwrap_exec_transaction(&calldata);
        }
        decoded
    }

    /// Walk `DECODE_CHAIN` in order and return the first successful
    /// attempt. `Raw` never fails, so the walk always produces a value.
    async fn run_chain(
        &self,
        calldata: &str,
        selector: &str,
        contract_address: &str,
        chain_id: u64,
        protocol: Option<crate::domain::ProtocolInfo>,
    ) -> DecodedTransaction {
        for step in DECODE_CHAIN {
            let attempt = match step {
                DecodeStep::Local => self.try_local(calldata, protocol.clone()),
                DecodeStep::Explorer => {
                    self.try_etherscan(calldata, contract_address, chain_id, protocol.clone())
                        .await
                }
                DecodeStep::Sourcify => {
                    self.try_sourcify(calldata, contract_address, chain_id, protocol.clone())
                        .await
                }
                DecodeStep::FourByte => {
                    self.try_fourbyte(calldata, selector, protocol.clone()).await
                }
                DecodeStep::Erc20Table => try_erc20_table(calldata, selector, protocol.clone()),
                DecodeStep::Raw => Some(raw_unknown(calldata, selector, protocol.clone())),
            };
            if let Some(d) = attempt {
                return d;
            }
        }
        raw_unknown(calldata, selector, protocol)
    }

    fn try_local(
        &self,
        calldata: &str,
        protocol: Option<crate::domain::ProtocolInfo>,
    ) -> Option<DecodedTransaction> {
        let def = local_defs().get(&calldata[..10])?;
        let values = abi::decode_inputs(calldata, &def.inputs)?;
        Some(DecodedTransaction {
            function_name: def.name.clone(),
            function_signature: def.signature.clone(),
            parameters: build_parameters(def, &values),
            protocol,
            contract_verified: true,
            function_source: Provenance::Local,
            is_safe_proxy: false,
            inner_transaction: None,
        })
    }

    async fn try_etherscan(
        &self,
        calldata: &str,
        contract_address: &str,
        chain_id: u64,
        protocol: Option<crate::domain::ProtocolInfo>,
    ) -> Option<DecodedTransaction> {
        let api_key = self.etherscan_api_key.as_deref()?;
        if !registry::ETHERSCAN_SUPPORTED_CHAINS.contains(&chain_id) {
            return None;
        }
        let url = format!(
            "{}?chainid={}&module=contract&action=getabi&address={}&apikey={}",
            registry::ETHERSCAN_V2_BASE,
            chain_id,
            contract_address,
            api_key
        );
        let body: Value = self.http.get(&url).send().await.ok()?.json().await.ok()?;
        if body.get("status").and_then(|s| s.as_str()) != Some("1") {
            return None;
        }
        let abi_text = body.get("result")?.as_str()?;
        let abi: Value = serde_json::from_str(abi_text).ok()?;
        self.decode_with_abi(calldata, &abi, protocol, Provenance::Etherscan)
    }

    async fn try_sourcify(
        &self,
        calldata: &str,
        contract_address: &str,
        chain_id: u64,
        protocol: Option<crate::domain::ProtocolInfo>,
    ) -> Option<DecodedTransaction> {
        let address = util::checksum_address(contract_address);
        for match_kind in ["full_match", "partial_match"] {
            let url = format!(
                "{}/{}/{}/{}/metadata.json",
                registry::SOURCIFY_BASE,
                match_kind,
                chain_id,
                address
            );
            let Ok(resp) = self.http.get(&url).send().await else {
                continue;
            };
            if !resp.status().is_success() {
                continue;
            }
            let Ok(metadata) = resp.json::<Value>().await else {
                continue;
            };
            let Some(abi) = metadata.pointer("/output/abi") else {
                continue;
            };
            if let Some(d) = self.decode_with_abi(calldata, abi, protocol.clone(), Provenance::Sourcify)
            {
                return Some(d);
            }
        }
        None
    }

    async fn try_fourbyte(
        &self,
        calldata: &str,
        selector: &str,
        protocol: Option<crate::domain::ProtocolInfo>,
    ) -> Option<DecodedTransaction> {
        let url = format!("{}?hex_signature={}", registry::FOURBYTE_BASE, selector);
        let body: Value = self.http.get(&url).send().await.ok()?.json().await.ok()?;
        let results = body.get("results")?.as_array()?;
        // Lowest id is the earliest submission, least likely to be a
        // collision squatter.
        let best = results
            .iter()
            .min_by_key(|r| r.get("id").and_then(|i| i.as_u64()).unwrap_or(u64::MAX))?;
        let text_signature = best.get("text_signature")?.as_str()?;
        let def = abi::parse_signature(text_signature)?;
        let parameters = match abi::decode_inputs(calldata, &def.inputs) {
            Some(values) => build_parameters(&def, &values),
            None => parse_raw_params(calldata),
        };
        Some(DecodedTransaction {
            function_name: def.name.clone(),
            function_signature: def.signature,
            parameters,
            protocol,
            contract_verified: false,
            function_source: Provenance::FourByte,
            is_safe_proxy: false,
            inner_transaction: None,
        })
    }

    fn decode_with_abi(
        &self,
        calldata: &str,
        abi: &Value,
        protocol: Option<crate::domain::ProtocolInfo>,
        source: Provenance,
    ) -> Option<DecodedTransaction> {
        let selector = &calldata[..10];
        let defs = abi::functions_from_abi_json(abi);
        let def = defs.into_iter().find(|d| d.selector == selector)?;
        let values = abi::decode_inputs(calldata, &def.inputs)?;
        Some(DecodedTransaction {
            function_name: def.name.clone(),
            function_signature: def.signature.clone(),
            parameters: build_parameters(&def, &values),
            protocol,
            contract_verified: true,
            function_source: source,
            is_safe_proxy: false,
            inner_transaction: None,
        })
    }

    /// Best-effort Safe proxy check: static singleton/factory sets, the
    /// protocol registry, and finally a storage-slot read of the
    /// proxied singleton. Network failures default to false.
    async fn detect_safe_proxy(&self, address: &str, chain_id: u64) -> bool {
        if registry::is_safe_singleton(address) || registry::is_safe_proxy_factory(address) {
            return true;
        }
        if let Some(info) = registry::known_protocol(address) {
            if info.name.contains("Safe") || info.category == "Wallet" {
                return true;
            }
        }
        if let Some(client) = ChainClient::for_chain(chain_id) {
            if let Some(singleton) = client.proxy_singleton(address).await {
                return registry::is_safe_singleton(&singleton);
            }
        }
        false
    }
}

/// Built-in ERC-20 selector table: recovers the function name when the
/// arguments do not decode cleanly. Parameters stay heuristic and the
/// contract is not treated as verified.
fn try_erc20_table(
    calldata: &str,
    selector: &str,
    protocol: Option<crate::domain::ProtocolInfo>,
) -> Option<DecodedTransaction> {
    let sig = registry::erc20_signature(selector)?;
    Some(DecodedTransaction {
        function_name: sig.split('(').next().unwrap_or(sig).to_string(),
        function_signature: sig.to_string(),
        parameters: parse_raw_params(calldata),
        protocol,
        contract_verified: false,
        function_source: Provenance::Raw,
        is_safe_proxy: false,
        inner_transaction: None,
    })
}

fn raw_unknown(
    calldata: &str,
    selector: &str,
    protocol: Option<crate::domain::ProtocolInfo>,
) -> DecodedTransaction {
    DecodedTransaction {
        function_name: format!("Unknown ({selector})"),
        function_signature: selector.to_string(),
        parameters: parse_raw_params(calldata),
        protocol,
        contract_verified: false,
        function_source: Provenance::Raw,
        is_safe_proxy: false,
        inner_transaction: None,
    }
}

/// Decode the inner call carried by `execTransaction` calldata.
pub fn unwrap_exec_transaction(calldata: &str) -> Option<InnerTransaction> {
    let def = local_defs().get(registry::EXEC_TRANSACTION_SELECTOR)?;
    let values = abi::decode_inputs(calldata, &def.inputs)?;
    let to = values.first()?.as_str()?.to_string();
    let value = values.get(1)?.as_str()?.to_string();
    let data = values.get(2)?.as_str()?.to_string();
    let operation = values.get(3)?.as_str()?.parse::<u8>().ok()?;
    Some(InnerTransaction {
        to,
        value,
        data,
        operation,
    })
}

fn build_parameters(def: &FunctionDef, values: &[Value]) -> Vec<DecodedParameter> {
    def.inputs
        .iter()
        .zip(values.iter())
        .enumerate()
        .map(|(i, (input, value))| {
            let name = if input.name.is_empty() {
                format!("param{i}")
            } else {
                input.name.clone()
            };
            let label = param_label(&def.name, &name);
            DecodedParameter {
                name,
                param_type: abi::canonical_type(&input.kind),
                value: abi::format_value(value),
                label,
            }
        })
        .collect()
}

/// Word-split heuristic for undecodable calldata: each 32-byte chunk is
/// an address when it carries 12 bytes of zero padding, else a uint256.
fn parse_raw_params(calldata: &str) -> Vec<DecodedParameter> {
    let hex = util::strip_0x(calldata);
    if hex.len() <= 8 {
        return Vec::new();
    }
    let data = &hex[8..];
    let mut params = Vec::new();
    let mut i = 0usize;
    while i + 64 <= data.len() {
        let chunk = &data[i..i + 64];
        let is_address = chunk.starts_with("000000000000000000000000");
        params.push(DecodedParameter {
            name: format!("param{}", i / 64),
            param_type: if is_address { "address" } else { "uint256" }.to_string(),
            value: if is_address {
                format!("0x{}", &chunk[24..])
            } else {
                format!("0x{chunk}")
            },
            label: None,
        });
        i += 64;
    }
    params
}

fn param_label(function_name: &str, param_name: &str) -> Option<String> {
    let label = match (function_name, param_name) {
        ("approve", "spender") => "Address authorized to spend",
        ("approve", "amount") => "Maximum authorized amount",
        ("transfer", "to") => "Destination address",
        ("transfer", "amount") => "Amount to transfer",
        ("transferFrom", "from") => "Source address",
        ("transferFrom", "to") => "Destination address",
        ("transferFrom", "amount") => "Amount to transfer",
        ("swapExactTokensForTokens", "amountIn") => "Amount of tokens to swap",
        ("swapExactTokensForTokens", "amountOutMin") => "Minimum tokens to receive",
        ("swapExactTokensForTokens", "path") => "Swap route (intermediate tokens)",
        ("swapExactTokensForTokens", "to") => "Address receiving tokens",
        ("swapExactTokensForTokens", "deadline") => "Transaction deadline",
        ("supply", "asset") => "Token to deposit",
        ("supply", "amount") => "Amount to deposit",
        ("supply", "onBehalfOf") => "Deposit beneficiary",
        ("withdraw", "asset") => "Token to withdraw",
        ("withdraw", "amount") => "Amount to withdraw",
        ("withdraw", "to") => "Receiving address",
        ("borrow", "asset") => "Token to borrow",
        ("borrow", "amount") => "Amount to borrow",
        ("borrow", "interestRateMode") => "Interest type (1=stable, 2=variable)",
        ("supplyCollateral", "marketParams") => "Morpho market parameters",
        ("supplyCollateral", "assets") => "Amount of collateral to deposit",
        ("supplyCollateral", "onBehalf") => "Deposit beneficiary",
        ("withdrawCollateral", "marketParams") => "Morpho market parameters",
        ("withdrawCollateral", "assets") => "Amount of collateral to withdraw",
        ("withdrawCollateral", "onBehalf") => "Collateral owner",
        ("withdrawCollateral", "receiver") => "Receiving address",
        ("liquidate", "marketParams") => "Morpho market parameters",
        ("liquidate", "borrower") => "Address of borrower to liquidate",
        ("liquidate", "seizedAssets") => "Collateral to seize",
        ("setAuthorization", "authorized") => "Authorized address",
        ("setAuthorization", "newIsAuthorized") => "New authorization status",
        _ => return None,
    };
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_bundle_parses_cleanly() {
        // every declaration parses and no two share a selector
        assert_eq!(local_defs().len(), LOCAL_ABIS.len());
        assert!(local_defs().contains_key("0x095ea7b3"));
        assert!(local_defs().contains_key(registry::EXEC_TRANSACTION_SELECTOR));
    }

    #[test]
    fn raw_params_guess_addresses() {
        let data = format!(
            "0xdeadbeef{:0>64}{:064x}",
            "1111111254eeb25477b68fb85ed929f73a960582", 42u64
        );
        let params = parse_raw_params(&data);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].param_type, "address");
        assert_eq!(
            params[0].value,
            "0x1111111254eeb25477b68fb85ed929f73a960582"
        );
        assert_eq!(params[1].param_type, "uint256");
    }

    #[test]
    fn exec_transaction_unwraps_inner_call() {
        // execTransaction(to, value, data, operation, ...) with a
        // 4-byte inner payload.
        let inner_to = "a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
        let mut data = String::from("0x6a761202");
        data.push_str(&format!("{:0>64}", inner_to)); // to
        data.push_str(&format!("{:064x}", 0u64)); // value
        data.push_str(&format!("{:064x}", 320u64)); // offset(data)
        data.push_str(&format!("{:064x}", 0u64)); // operation
        data.push_str(&format!("{:064x}", 0u64)); // safeTxGas
        data.push_str(&format!("{:064x}", 0u64)); // baseGas
        data.push_str(&format!("{:064x}", 0u64)); // gasPrice
        data.push_str(&format!("{:064x}", 0u64)); // gasToken
        data.push_str(&format!("{:064x}", 0u64)); // refundReceiver
        data.push_str(&format!("{:064x}", 384u64)); // offset(signatures)
        data.push_str(&format!("{:064x}", 4u64)); // data length
        data.push_str(&format!("{:0<64}", "aabbccdd")); // data payload
        data.push_str(&format!("{:064x}", 0u64)); // signatures length
        let inner = unwrap_exec_transaction(&data).unwrap();
        assert_eq!(inner.to, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        assert_eq!(inner.value, "0");
        assert_eq!(inner.data, "0xaabbccdd");
        assert_eq!(inner.operation, 0);
    }

    #[test]
    fn fallback_chain_runs_local_first_and_raw_last() {
        assert_eq!(
            DECODE_CHAIN,
            &[
                DecodeStep::Local,
                DecodeStep::Explorer,
                DecodeStep::Sourcify,
                DecodeStep::FourByte,
                DecodeStep::Erc20Table,
                DecodeStep::Raw,
            ]
        );
    }

    #[test]
    fn erc20_table_recovers_name_from_undecodable_args() {
        // truncated approve args fail the word-level decoder but the
        // selector still names the function
        let d = try_erc20_table("0x095ea7b3aaaa", "0x095ea7b3", None).unwrap();
        assert_eq!(d.function_name, "approve");
        assert_eq!(d.function_signature, "approve(address,uint256)");
        assert_eq!(d.function_source, Provenance::Raw);
        assert!(!d.contract_verified);
        assert!(try_erc20_table("0xdeadbeef", "0xdeadbeef", None).is_none());
    }

    #[tokio::test]
    async fn multibyte_calldata_degrades_to_unknown() {
        // char boundary violated at byte 10; must not panic
        let decoder = Decoder::new(None);
        let decoded = decoder
            .decode(&DecodeRequest {
                calldata: "0x1234567é".to_string(),
                contract_address: "0x1111111254eeb25477b68fb85ed929f73a960582".to_string(),
                chain_id: Some(8453),
            })
            .await;
        assert_eq!(decoded.function_name, "Unknown");
        assert_eq!(decoded.function_source, Provenance::Raw);
        assert!(decoded.parameters.is_empty());
    }

    #[test]
    fn static_singleton_set_marks_safe_proxy() {
        assert!(registry::is_safe_singleton(
            "0xd9Db270c1B5E3Bd161E8c8503c55cEABeE709552"
        ));
    }
}
