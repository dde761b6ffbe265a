// Configuration management module
// This file handles loading and parsing of configuration settings
// from an optional config file layered under environment variables
//
// Numan Thabit 2025 Nov

use crate::chains;
use crate::gas::wallet::GasReserveConfig;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Environment variable naming an optional config file (yaml, toml or json).
pub const CONFIG_PATH_ENV: &str = "ROUTE_ENGINE_CONFIG";

const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Chain name (see `chains::CHAINS`) to RPC endpoint, gas wallet and reserve settings
    pub chains: BTreeMap<String, ChainConfig>,
    #[serde(default)]
    pub providers: ProviderKeys,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    #[serde(default)]
    pub gas: GasConfig,
    /// Concurrency control for route execution
    #[serde(default = "default_max_inflight_routes")]
    pub max_inflight_routes: usize,
    /// Routes admitted per second (defaults to 200)
    pub route_rate_per_sec: Option<u32>,
    /// Longest wait for admission before a route is turned back as RATE_LIMITED
    pub admission_timeout_ms: Option<u64>,
    /// Swap slippage tolerance in percent
    #[serde(default = "default_slippage_pct")]
    pub slippage_tolerance_pct: f64,
    /// YAML file with persisted per-chain reserve overrides
    pub reserve_overrides_path: Option<PathBuf>,
    /// Price API base, defaults to the public CoinGecko endpoint
    pub coingecko_url: Option<Url>,
    pub coingecko_api_key: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: Url,
    /// Hex-encoded secp256k1 key of the chain's gas wallet (replace with HSM in prod)
    pub wallet_key_hex: String,
    /// Blocks required before a step is final
    pub confirmations: Option<u64>,
    pub confirmation_timeout_secs: Option<u64>,
    pub reserve: Option<GasReserveConfig>,
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("wallet_key_hex", &"<redacted>")
            .field("confirmations", &self.confirmations)
            .field("confirmation_timeout_secs", &self.confirmation_timeout_secs)
            .field("reserve", &self.reserve)
            .finish()
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct ProviderKeys {
    pub oneinch_api_key: Option<String>,
    pub zerox_api_key: Option<String>,
    pub lifi_api_key: Option<String>,
    pub socket_api_key: Option<String>,
    /// Swap provider preference, highest first
    #[serde(default)]
    pub swap_priority: Vec<String>,
}

impl fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderKeys")
            .field("oneinch_api_key", &mask(&self.oneinch_api_key))
            .field("zerox_api_key", &mask(&self.zerox_api_key))
            .field("lifi_api_key", &mask(&self.lifi_api_key))
            .field("socket_api_key", &mask(&self.socket_api_key))
            .field("swap_priority", &self.swap_priority)
            .finish()
    }
}

impl ProviderKeys {
    pub const DEFAULT_SWAP_PRIORITY: [&'static str; 3] = ["1inch", "0x", "lifi"];

    pub fn swap_priority(&self) -> Vec<String> {
        if self.swap_priority.is_empty() {
            Self::DEFAULT_SWAP_PRIORITY
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.swap_priority.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_percent: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_percent: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub monitoring_window_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout_secs: 60,
            monitoring_window_secs: 300,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn monitoring_window(&self) -> Duration {
        Duration::from_secs(self.monitoring_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub monitor_interval_secs: u64,
    pub rebalance_interval_secs: u64,
    pub balance_ttl_secs: u64,
    pub gas_price_ttl_secs: u64,
    /// Transfers below this amount are not worth a bridge fee
    pub min_rebalance_usd: f64,
    /// A chain holds surplus above `target * surplus_multiplier`
    pub surplus_multiplier: f64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 300,
            rebalance_interval_secs: 900,
            balance_ttl_secs: 60,
            gas_price_ttl_secs: 30,
            min_rebalance_usd: 100.0,
            surplus_multiplier: 1.5,
        }
    }
}

fn default_max_inflight_routes() -> usize {
    32
}

fn default_slippage_pct() -> f64 {
    0.5
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        let cfg = builder
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("providers.swap_priority"),
            )
            .build()
            .context("assemble configuration sources")?;
        let parsed: AppConfig = cfg
            .try_deserialize()
            .context("deserialize configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            bail!("no chains configured; set CHAINS__<NAME>__RPC_URL and CHAINS__<NAME>__WALLET_KEY_HEX");
        }
        for (name, chain) in &self.chains {
            if chains::chain_info(name).is_none() {
                bail!("unsupported chain in configuration: {name}");
            }
            if chain.wallet_key_hex.trim().is_empty() {
                bail!("chain {name} has an empty wallet key");
            }
            if chain.confirmations == Some(0) {
                bail!("chain {name} needs at least one confirmation");
            }
        }
        if !(0.0..=50.0).contains(&self.slippage_tolerance_pct) {
            bail!(
                "slippage tolerance {}% out of range",
                self.slippage_tolerance_pct
            );
        }
        Ok(())
    }

    pub fn admission_timeout(&self) -> Option<Duration> {
        self.admission_timeout_ms.map(Duration::from_millis)
    }

    pub fn confirmations(&self, chain: &str) -> u64 {
        self.chains
            .get(chain)
            .and_then(|c| c.confirmations)
            .or_else(|| chains::chain_info(chain).map(|c| c.default_confirmations))
            .unwrap_or(1)
            .max(1)
    }

    pub fn confirmation_timeout(&self, chain: &str) -> Duration {
        let secs = self
            .chains
            .get(chain)
            .and_then(|c| c.confirmation_timeout_secs)
            .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Configured reserve for a chain, falling back to the built-in default.
    pub fn reserve_for(&self, chain: &str) -> GasReserveConfig {
        self.chains
            .get(chain)
            .and_then(|c| c.reserve)
            .unwrap_or_else(|| chains::default_reserve(chain))
    }
}
