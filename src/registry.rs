//! Static lookup data: known protocols, chains, selectors, payment constants.

use crate::domain::{DecodedTransaction, ProtocolInfo};

// ── Chains ──────────────────────────────────────────────────────────

pub fn chain_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("Ethereum Mainnet"),
        8453 => Some("Base"),
        10 => Some("Optimism"),
        42161 => Some("Arbitrum One"),
        137 => Some("Polygon"),
        _ => None,
    }
}

pub fn safe_tx_service_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://api.safe.global/tx-service/eth"),
        8453 => Some("https://api.safe.global/tx-service/base"),
        10 => Some("https://api.safe.global/tx-service/oeth"),
        42161 => Some("https://api.safe.global/tx-service/arb"),
        137 => Some("https://api.safe.global/tx-service/matic"),
        _ => None,
    }
}

pub fn public_rpc_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://eth.llamarpc.com"),
        8453 => Some("https://mainnet.base.org"),
        10 => Some("https://mainnet.optimism.io"),
        42161 => Some("https://arb1.arbitrum.io/rpc"),
        137 => Some("https://polygon-rpc.com"),
        _ => None,
    }
}

// Etherscan V2: one endpoint for every chain, chainid as a query param.
pub const ETHERSCAN_V2_BASE: &str = "https://api.etherscan.io/v2/api";
pub const ETHERSCAN_SUPPORTED_CHAINS: [u64; 5] = [1, 8453, 10, 42161, 137];

// Allow-list enforced by request validation.
pub const VALID_CHAIN_IDS: [u64; 4] = [1, 8453, 10, 42161];

pub const SOURCIFY_BASE: &str = "https://sourcify.dev/server/repository/contracts";
pub const FOURBYTE_BASE: &str = "https://www.4byte.directory/api/v1/signatures/";

// ── Known protocols (lowercase contract address) ────────────────────

pub fn known_protocol(address: &str) -> Option<ProtocolInfo> {
    let (name, category, website) = match address.to_lowercase().as_str() {
        "0x7a250d5630b4cf539739df2c5dacb4c659f2488d" => {
            ("Uniswap V2 Router", "DEX", "https://uniswap.org")
        }
        "0xe592427a0aece92de3edee1f18e0157c05861564" => {
            ("Uniswap V3 Router", "DEX", "https://uniswap.org")
        }
        "0x3fc91a3afd70395cd496c647d5a6cc9d4b2b7fad" => {
            ("Uniswap Universal Router", "DEX", "https://uniswap.org")
        }
        "0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45" => {
            ("Uniswap V3 Router 2", "DEX", "https://uniswap.org")
        }
        "0x87870bca3f3fd6335c3f4ce8392d69350b4fa4e2" => {
            ("Aave V3 Pool (Mainnet)", "Lending", "https://aave.com")
        }
        "0xa238dd80c259a72e81d7e4664a9801593f98d1c5" => {
            ("Aave V3 Pool (Base)", "Lending", "https://aave.com")
        }
        "0xae7ab96520de3a18e5e111b5eaab095312d7fe84" => {
            ("Lido stETH", "Staking", "https://lido.fi")
        }
        "0x1111111254eeb25477b68fb85ed929f73a960582" => {
            ("1inch Router V5", "DEX Aggregator", "https://1inch.io")
        }
        "0xbebc44782c7db0a1a60cb6fe97d0b483032ff1c7" => {
            ("Curve 3pool", "DEX", "https://curve.fi")
        }
        "0x00000000000000adc04c56bf30ac9d3c0aaf14dc" => {
            ("Seaport 1.5", "NFT Marketplace", "https://opensea.io")
        }
        "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2" => ("WETH", "Token", "https://weth.io"),
        "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48" => ("USDC", "Token", "https://circle.com"),
        "0xdac17f958d2ee523a2206206994597c13d831ec7" => ("USDT", "Token", "https://tether.to"),
        "0x6b175474e89094c44da98b954eedeac495271d0f" => ("DAI", "Token", "https://makerdao.com"),
        "0xbbbbbbbbbb9cc5e90e3b3af64bdaf62c37eeffcb" => {
            ("Morpho Blue", "Lending", "https://morpho.org")
        }
        "0x38989bba00bdf8181f4082995b3deae96163ac5d" => {
            ("Morpho Blue (Base)", "Lending", "https://morpho.org")
        }
        "0xc3d688b66703497daa19211eedff47f25384cdc3" => {
            ("Compound V3 (USDC)", "Lending", "https://compound.finance")
        }
        "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913" => {
            ("USDC (Base)", "Token", "https://circle.com")
        }
        "0x4200000000000000000000000000000000000006" => {
            ("WETH (Base)", "Token", "https://base.org")
        }
        "0x2ae3f1ec7f1f5012cfeab0185bfc7aa3cf0dec22" => {
            ("cbETH (Base)", "Token", "https://coinbase.com")
        }
        "0xd9aaec86b65d86f6a7b5b1b0c42ffa531710b6ca" => {
            ("USDbC (Base)", "Token", "https://base.org")
        }
        "0x50c5725949a6f0c72e6c4a641f24049a917db0cb" => {
            ("DAI (Base)", "Token", "https://makerdao.com")
        }
        "0x38869bf66a61cf6bdb996a6ae40d5853fd43b526" => {
            ("Safe MultiSend", "Infrastructure", "https://safe.global")
        }
        _ => return None,
    };
    Some(ProtocolInfo {
        name: name.to_string(),
        category: category.to_string(),
        website: Some(website.to_string()),
    })
}

// ── Selectors ───────────────────────────────────────────────────────

/// Built-in ERC-20 selector table, the last name source before the raw
/// fallback.
pub fn erc20_signature(selector: &str) -> Option<&'static str> {
    match selector {
        "0x095ea7b3" => Some("approve(address,uint256)"),
        "0xa9059cbb" => Some("transfer(address,uint256)"),
        "0x23b872dd" => Some("transferFrom(address,address,uint256)"),
        "0x70a08231" => Some("balanceOf(address)"),
        "0xdd62ed3e" => Some("allowance(address,address)"),
        "0x18160ddd" => Some("totalSupply()"),
        "0x313ce567" => Some("decimals()"),
        "0x06fdde03" => Some("name()"),
        "0x95d89b41" => Some("symbol()"),
        _ => None,
    }
}

pub const APPROVE_SELECTOR: &str = "0x095ea7b3";
pub const TRANSFER_SELECTOR: &str = "0xa9059cbb";
pub const EXEC_TRANSACTION_SELECTOR: &str = "0x6a761202";

pub fn is_ownership_transfer_selector(selector: &str) -> bool {
    matches!(
        selector,
        "0xf2fde38b" // transferOwnership(address)
            | "0x8da5cb5b" // owner()
            | "0x715018a6" // renounceOwnership()
            | "0x13af4035" // setOwner(address)
            | "0xa6f9dae1" // changeOwner(address)
            | "0x893d20e8" // getOwner()
    )
}

pub fn is_proxy_upgrade_selector(selector: &str) -> bool {
    matches!(
        selector,
        "0x3659cfe6" // upgradeTo(address)
            | "0x4f1ef286" // upgradeToAndCall(address,bytes)
            | "0x99a88ec4" // upgrade(address)
            | "0x6a627842" // mint(address)
            | "0x5c60da1b" // implementation()
    )
}

/// Selectors commonly seen in drain/exploit patterns.
pub fn is_malicious_selector(selector: &str) -> bool {
    matches!(
        selector,
        "0x70a08231" // balanceOf - reentrancy probes
            | "0x18160ddd" // totalSupply - flash loan probes
            | "0x095ea7b3" // approve
            | "0x23b872dd" // transferFrom - token draining
            | "0xa22cb465" // setApprovalForAll - NFT drain
            | "0x42842e0e" // safeTransferFrom
            | "0xf242432a" // safeTransferFrom ERC1155
    )
}

pub fn is_swap_selector(selector: &str) -> bool {
    matches!(
        selector,
        "0x38ed1739" | "0x7ff36ab5" | "0x18cbafe5" | "0x5ae401dc" | "0x04e45aaf"
    )
}

// ── Safe proxy detection ────────────────────────────────────────────

/// Canonical Safe singleton deployments (1.3.0 and 1.4.1), lowercase.
pub fn is_safe_singleton(address: &str) -> bool {
    matches!(
        address.to_lowercase().as_str(),
        "0xd9db270c1b5e3bd161e8c8503c55ceabee709552"
            | "0x3e5c63644e683549055b9be8653de26e0b4cd36e"
            | "0x41675c099f32341bf84bfc5382af534df5c7461a"
            | "0x29fcb43b46531bca003ddc8fcb67ffe91900c762"
            | "0xfb1bffc9d739b8d520daf37df666da4c687191ea"
    )
}

pub fn is_safe_proxy_factory(address: &str) -> bool {
    matches!(
        address.to_lowercase().as_str(),
        "0xa6b71e26c5e0845f74c812102ca7114b6a896ab2"
            | "0x4e1dcf7ad4e460cfd30791ccc4f9c8a4f820ec67"
            | "0xc22834581ebc8527d974f8a1c97e1bea4ef910bc"
    )
}

// ── Unlimited approval ──────────────────────────────────────────────

pub const MAX_UINT256_HEX: &str =
    "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
pub const MAX_UINT256_DECIMAL: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

/// Single predicate shared by the policy engine and the risk service.
/// Matches the raw amount word after the spender slot, and falls back
/// to decoded parameters named `amount`/`value`.
pub fn is_unlimited_approval(data: &str, decoded: Option<&DecodedTransaction>) -> bool {
    if data.len() >= 10 && data[..10].eq_ignore_ascii_case(APPROVE_SELECTOR) {
        // selector (4 bytes) + spender word (32 bytes) = 74 hex chars
        if data.len() > 74 {
            let amount_hex = data[74..].trim_start_matches('0').to_lowercase();
            if amount_hex == MAX_UINT256_HEX {
                return true;
            }
        }
    }
    if let Some(decoded) = decoded {
        if let Some(param) = decoded
            .parameters
            .iter()
            .find(|p| p.name == "amount" || p.name == "value")
        {
            if param.value == MAX_UINT256_DECIMAL || param.value.contains("ffffffff") {
                return true;
            }
        }
    }
    false
}

// ── Thresholds and payments ─────────────────────────────────────────

pub const LARGE_TRANSFER_THRESHOLD_USD: f64 = 10_000.0;
pub const NEW_CONTRACT_THRESHOLD_DAYS: u64 = 7;
pub const HIGH_GAS_THRESHOLD: u64 = 500_000;
pub const LARGE_VALUE_THRESHOLD_ETH: f64 = 10.0;

// Stale price approximation, only used when the simulator supplies no
// USD deltas.
pub const ETH_USD_FALLBACK: f64 = 3200.0;

pub const PAYMENT_WALLET: &str = "0xCc75959A8Fa6ed76F64172925c0799ad94ab0B84";
pub const PAYMENT_CHAIN_ID: u64 = 8453;
pub const PAYMENT_USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const MONTHLY_PRICE_USD: u64 = 20;
// ~0.003 ETH, a generous floor for the $20 monthly price.
pub const MIN_PAYMENT_WEI: u128 = 3_000_000_000_000_000;
pub const DAIMO_AMOUNT_MIN: f64 = 19.0;
pub const DAIMO_AMOUNT_MAX: f64 = 21.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_approval_on_raw_calldata() {
        let data = format!("0x095ea7b3{}{}", "0".repeat(24 + 40), "f".repeat(64));
        assert!(is_unlimited_approval(&data, None));
    }

    #[test]
    fn bounded_approval_is_not_unlimited() {
        let data = format!("0x095ea7b3{}{:064x}", "0".repeat(24 + 40), 1_000u64);
        assert!(!is_unlimited_approval(&data, None));
    }

    #[test]
    fn non_approval_selector_never_matches() {
        let data = format!("0xa9059cbb{}{}", "0".repeat(24 + 40), "f".repeat(64));
        assert!(!is_unlimited_approval(&data, None));
    }

    #[test]
    fn chain_tables_agree_on_supported_chains() {
        for id in VALID_CHAIN_IDS {
            assert!(chain_name(id).is_some());
            assert!(safe_tx_service_url(id).is_some());
            assert!(public_rpc_url(id).is_some());
        }
        assert!(safe_tx_service_url(5).is_none());
    }
}
