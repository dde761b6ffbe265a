// Chain and token registry
// Static per-chain metadata: chain ids, native assets, confirmation defaults,
// default gas reserves, bridge endpoints and well-known token addresses
//
// Numan Thabit 2025 Nov

use crate::gas::wallet::GasReserveConfig;
use alloy::primitives::Address;
use std::str::FromStr;

/// Sentinel used by aggregators for the chain's native asset.
pub const NATIVE_TOKEN_ADDRESS: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Native assets across the supported chains use 18 decimals.
pub const NATIVE_DECIMALS: u32 = 18;

pub const STABLECOINS: [&str; 6] = ["USDC", "USDT", "DAI", "USDC.E", "BUSD", "FRAX"];

#[derive(Debug, Clone, Copy)]
pub struct ChainInfo {
    pub name: &'static str,
    pub chain_id: u64,
    pub native_symbol: &'static str,
    pub default_confirmations: u64,
    /// Member of the EVM set that native gas can be bridged between.
    pub bridgeable: bool,
    /// LayerZero v1 endpoint id used by Stargate.
    pub layerzero_id: Option<u16>,
    pub stargate_router: Option<&'static str>,
    pub default_reserve: GasReserveConfig,
}

const L1_RESERVE: GasReserveConfig = GasReserveConfig {
    min_balance_usd: 1_000.0,
    target_balance_usd: 3_000.0,
    alert_threshold_usd: 1_500.0,
    critical_threshold_usd: 500.0,
};

const L2_RESERVE: GasReserveConfig = GasReserveConfig {
    min_balance_usd: 200.0,
    target_balance_usd: 1_000.0,
    alert_threshold_usd: 300.0,
    critical_threshold_usd: 100.0,
};

const SIDECHAIN_RESERVE: GasReserveConfig = GasReserveConfig {
    min_balance_usd: 100.0,
    target_balance_usd: 500.0,
    alert_threshold_usd: 150.0,
    critical_threshold_usd: 50.0,
};

pub const CHAINS: [ChainInfo; 9] = [
    ChainInfo {
        name: "ethereum",
        chain_id: 1,
        native_symbol: "ETH",
        default_confirmations: 2,
        bridgeable: true,
        layerzero_id: Some(101),
        stargate_router: Some("0x8731d54E9D02c286767d56ac03e8037C07e01e98"),
        default_reserve: L1_RESERVE,
    },
    ChainInfo {
        name: "bsc",
        chain_id: 56,
        native_symbol: "BNB",
        default_confirmations: 3,
        bridgeable: true,
        layerzero_id: Some(102),
        stargate_router: Some("0x4a364f8c717cAAD9A442737Eb7b8A55cc6cf18D8"),
        default_reserve: SIDECHAIN_RESERVE,
    },
    ChainInfo {
        name: "avalanche",
        chain_id: 43114,
        native_symbol: "AVAX",
        default_confirmations: 1,
        bridgeable: true,
        layerzero_id: Some(106),
        stargate_router: Some("0x45A01E4e04F14f7A4a6702c74187c5F6222033cd"),
        default_reserve: SIDECHAIN_RESERVE,
    },
    ChainInfo {
        name: "polygon",
        chain_id: 137,
        native_symbol: "POL",
        default_confirmations: 3,
        bridgeable: true,
        layerzero_id: Some(109),
        stargate_router: Some("0x45A01E4e04F14f7A4a6702c74187c5F6222033cd"),
        default_reserve: SIDECHAIN_RESERVE,
    },
    ChainInfo {
        name: "arbitrum",
        chain_id: 42161,
        native_symbol: "ETH",
        default_confirmations: 1,
        bridgeable: true,
        layerzero_id: Some(110),
        stargate_router: Some("0x53Bf833A5d6c4ddA888F69c22C88C9f356a41614"),
        default_reserve: L2_RESERVE,
    },
    ChainInfo {
        name: "optimism",
        chain_id: 10,
        native_symbol: "ETH",
        default_confirmations: 1,
        bridgeable: true,
        layerzero_id: Some(111),
        stargate_router: Some("0xB0D502E938ed5f4df2E681fE6E419ff29631d62b"),
        default_reserve: L2_RESERVE,
    },
    ChainInfo {
        name: "base",
        chain_id: 8453,
        native_symbol: "ETH",
        default_confirmations: 1,
        bridgeable: true,
        layerzero_id: Some(184),
        stargate_router: Some("0x45f1A95A4D3f3836523F5c83673c797f4d4d263B"),
        default_reserve: L2_RESERVE,
    },
    ChainInfo {
        name: "linea",
        chain_id: 59144,
        native_symbol: "ETH",
        default_confirmations: 1,
        bridgeable: false,
        layerzero_id: None,
        stargate_router: None,
        default_reserve: L2_RESERVE,
    },
    ChainInfo {
        name: "gnosis",
        chain_id: 100,
        native_symbol: "XDAI",
        default_confirmations: 2,
        bridgeable: false,
        layerzero_id: None,
        stargate_router: None,
        default_reserve: SIDECHAIN_RESERVE,
    },
];

pub fn chain_info(name: &str) -> Option<&'static ChainInfo> {
    CHAINS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Reserve defaults for chains missing from the table.
pub fn default_reserve(chain: &str) -> GasReserveConfig {
    chain_info(chain)
        .map(|c| c.default_reserve)
        .unwrap_or(SIDECHAIN_RESERVE)
}

pub fn mutually_bridgeable(a: &str, b: &str) -> bool {
    match (chain_info(a), chain_info(b)) {
        (Some(x), Some(y)) => x.bridgeable && y.bridgeable && x.name != y.name,
        _ => false,
    }
}

pub fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(symbol))
}

/// True for the chain's native symbol, the aggregator sentinel and the zero address.
pub fn is_native_token(chain: &str, token: &str) -> bool {
    if token.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS)
        || token.eq_ignore_ascii_case("0x0000000000000000000000000000000000000000")
    {
        return true;
    }
    chain_info(chain)
        .map(|c| c.native_symbol.eq_ignore_ascii_case(token))
        .unwrap_or(false)
}

/// (chain, symbol, address, decimals)
const TOKENS: &[(&str, &str, &str, u8)] = &[
    ("ethereum", "USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
    ("ethereum", "USDT", "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
    ("ethereum", "DAI", "0x6B175474E89094C44Da98b954EedeAC495271d0F", 18),
    ("ethereum", "WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18),
    ("polygon", "USDC", "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", 6),
    ("polygon", "USDT", "0xc2132D05D31c914a87C6611C10748AEb04B58e8F", 6),
    ("polygon", "DAI", "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063", 18),
    ("polygon", "WETH", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619", 18),
    ("arbitrum", "USDC", "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", 6),
    ("arbitrum", "USDT", "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", 6),
    ("arbitrum", "DAI", "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", 18),
    ("arbitrum", "WETH", "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1", 18),
    ("optimism", "USDC", "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", 6),
    ("optimism", "USDT", "0x94b008aA00579c1307B0EF2c499aD98a8ce58e58", 6),
    ("optimism", "DAI", "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", 18),
    ("optimism", "WETH", "0x4200000000000000000000000000000000000006", 18),
    ("base", "USDC", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", 6),
    ("base", "DAI", "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb", 18),
    ("base", "WETH", "0x4200000000000000000000000000000000000006", 18),
    ("bsc", "USDC", "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d", 18),
    ("bsc", "USDT", "0x55d398326f99059fF775485246999027B3197955", 18),
    ("avalanche", "USDC", "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E", 6),
    ("avalanche", "USDT", "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7", 6),
];

/// Resolve a token symbol (or pass through a literal address) to the address
/// aggregators expect. Native symbols resolve to the sentinel.
pub fn token_address(chain: &str, token: &str) -> Option<Address> {
    if is_native_token(chain, token) {
        return Address::from_str(NATIVE_TOKEN_ADDRESS).ok();
    }
    if token.starts_with("0x") {
        return Address::from_str(token).ok();
    }
    TOKENS
        .iter()
        .find(|(c, s, _, _)| c.eq_ignore_ascii_case(chain) && s.eq_ignore_ascii_case(token))
        .and_then(|(_, _, addr, _)| Address::from_str(addr).ok())
}

pub fn token_decimals(chain: &str, token: &str) -> Option<u8> {
    if is_native_token(chain, token) {
        return Some(NATIVE_DECIMALS as u8);
    }
    TOKENS
        .iter()
        .find(|(c, s, a, _)| {
            c.eq_ignore_ascii_case(chain)
                && (s.eq_ignore_ascii_case(token) || a.eq_ignore_ascii_case(token))
        })
        .map(|(_, _, _, d)| *d)
}
