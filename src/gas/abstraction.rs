// Gas abstraction
// This file owns one gas wallet per chain, caches balances and fee data,
// classifies reserves and drives single-flight rebalancing between chains
//
// Numan Thabit 2025 Nov

use crate::chains;
use crate::config::GasConfig;
use crate::errors::{ErrorCode, ExecError};
use crate::gas::rebalance::{plan_rebalance, ChainBalance, RebalanceBridge, RebalanceTransaction};
use crate::gas::wallet::{native_to_wei, wei_to_native, GasReserveConfig, GasWallet, ReserveStatus};
use crate::metrics::GAS_RESERVE_USD;
use crate::pricing::PriceOracle;
use crate::router::routes::{RouteStep, StepType};
use crate::storage::ExecutionStore;
use crate::transport::ChainRpc;
use alloy::primitives::{Address, U256};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const SWAP_GAS_UNITS: u64 = 250_000;
pub const BRIDGE_GAS_UNITS: u64 = 350_000;
pub const NATIVE_TRANSFER_GAS_UNITS: u64 = 21_000;
pub const TOKEN_TRANSFER_GAS_UNITS: u64 = 65_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: u128,
    pub max_priority_fee: u128,
}

impl FeeData {
    /// EIP-1559 cap with room for two base-fee doublings.
    pub fn max_fee_per_gas(&self) -> u128 {
        self.gas_price.saturating_mul(2).max(self.max_priority_fee)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasEstimate {
    pub gas_units: u64,
    pub gas_price: u128,
    pub cost_native: f64,
    pub cost_usd: f64,
}

struct ChainWallet {
    rpc: Arc<dyn ChainRpc>,
    address: Address,
    reserve: GasReserveConfig,
}

pub struct GasAbstraction {
    chains: BTreeMap<String, ChainWallet>,
    oracle: Arc<dyn PriceOracle>,
    store: Arc<dyn ExecutionStore>,
    settings: GasConfig,
    balances: RwLock<HashMap<String, (U256, Instant)>>,
    fees: RwLock<HashMap<String, (FeeData, Instant)>>,
    overrides: RwLock<HashMap<String, GasReserveConfig>>,
    rebalancing: AtomicBool,
}

/// Clears the single-flight flag however the pass ends.
struct RebalanceGuard<'a>(&'a AtomicBool);

impl Drop for RebalanceGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl GasAbstraction {
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        store: Arc<dyn ExecutionStore>,
        settings: GasConfig,
    ) -> Self {
        Self {
            chains: BTreeMap::new(),
            oracle,
            store,
            settings,
            balances: RwLock::new(HashMap::new()),
            fees: RwLock::new(HashMap::new()),
            overrides: RwLock::new(HashMap::new()),
            rebalancing: AtomicBool::new(false),
        }
    }

    /// Register a chain's gas wallet. `reserve` falls back to the chain default.
    pub fn with_chain(
        mut self,
        chain: &str,
        rpc: Arc<dyn ChainRpc>,
        address: Address,
        reserve: Option<GasReserveConfig>,
    ) -> Self {
        let reserve = reserve.unwrap_or_else(|| chains::default_reserve(chain));
        self.chains.insert(
            chain.to_string(),
            ChainWallet {
                rpc,
                address,
                reserve,
            },
        );
        self
    }

    pub fn settings(&self) -> &GasConfig {
        &self.settings
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }

    fn wallet(&self, chain: &str) -> Result<&ChainWallet, ExecError> {
        self.chains.get(chain).ok_or_else(|| {
            ExecError::invalid_route(format!("no gas wallet configured for chain {chain}"))
        })
    }

    pub fn rpc(&self, chain: &str) -> Result<Arc<dyn ChainRpc>, ExecError> {
        Ok(self.wallet(chain)?.rpc.clone())
    }

    pub fn address(&self, chain: &str) -> Result<Address, ExecError> {
        Ok(self.wallet(chain)?.address)
    }

    /// Persisted override, else configured, else built-in default.
    pub async fn reserve_config(&self, chain: &str) -> GasReserveConfig {
        if let Some(cfg) = self.overrides.read().await.get(chain) {
            return *cfg;
        }
        self.chains
            .get(chain)
            .map(|w| w.reserve)
            .unwrap_or_else(|| chains::default_reserve(chain))
    }

    pub async fn refresh_reserve_overrides(&self) {
        match self.store.reserve_overrides().await {
            Ok(latest) => *self.overrides.write().await = latest,
            Err(err) => warn!(error = %err, "reserve overrides unavailable, keeping previous"),
        }
    }

    /// Wei balance, cached for `balance_ttl_secs`.
    pub async fn get_balance(&self, chain: &str) -> Result<U256, ExecError> {
        let ttl = Duration::from_secs(self.settings.balance_ttl_secs);
        if let Some((balance, at)) = self.balances.read().await.get(chain) {
            if at.elapsed() < ttl {
                return Ok(*balance);
            }
        }
        let wallet = self.wallet(chain)?;
        let balance = wallet.rpc.get_balance(wallet.address).await?;
        self.balances
            .write()
            .await
            .insert(chain.to_string(), (balance, Instant::now()));
        Ok(balance)
    }

    /// Drop the cached balance after a confirmed spend or rebalance.
    pub async fn invalidate_balance(&self, chain: &str) {
        self.balances.write().await.remove(chain);
    }

    /// Gas price and priority fee, cached for `gas_price_ttl_secs`.
    pub async fn fee_data(&self, chain: &str) -> Result<FeeData, ExecError> {
        let ttl = Duration::from_secs(self.settings.gas_price_ttl_secs);
        if let Some((fees, at)) = self.fees.read().await.get(chain) {
            if at.elapsed() < ttl {
                return Ok(*fees);
            }
        }
        let wallet = self.wallet(chain)?;
        let gas_price = wallet.rpc.gas_price().await?;
        let max_priority_fee = match wallet.rpc.max_priority_fee().await {
            Ok(tip) => tip.min(gas_price),
            Err(err) => {
                debug!(chain = %chain, error = %err, "no priority fee endpoint, using 10% of gas price");
                gas_price / 10
            }
        };
        let fees = FeeData {
            gas_price,
            max_priority_fee,
        };
        self.fees
            .write()
            .await
            .insert(chain.to_string(), (fees, Instant::now()));
        Ok(fees)
    }

    pub async fn get_gas_wallet(&self, chain: &str) -> Result<GasWallet, ExecError> {
        let address = self.address(chain)?;
        let balance = self.get_balance(chain).await?;
        let price = self.oracle.native_token_price(chain).await?;
        let balance_native = wei_to_native(balance);
        let balance_usd = balance_native * price;
        let status = self.reserve_config(chain).await.classify(balance_usd);
        Ok(GasWallet {
            chain: chain.to_string(),
            address,
            balance,
            balance_native,
            balance_usd,
            status,
            last_updated: Utc::now(),
        })
    }

    /// Fee of `step` at the cached gas price, in native units and USD.
    pub async fn estimate_gas(&self, step: &RouteStep) -> Result<GasEstimate, ExecError> {
        let chain = step.from_chain.as_str();
        let gas_units = step.gas_estimate.unwrap_or_else(|| default_gas_units(step));
        let fees = self.fee_data(chain).await.map_err(|e| {
            if e.code().is_some() {
                e
            } else {
                ExecError::coded(ErrorCode::GasEstimationFailed, e.to_string())
            }
        })?;
        let cost_wei = U256::from(gas_units) * U256::from(fees.gas_price);
        let cost_native = wei_to_native(cost_wei);
        let price = self.oracle.native_token_price(chain).await?;
        Ok(GasEstimate {
            gas_units,
            gas_price: fees.gas_price,
            cost_native,
            cost_usd: cost_native * price,
        })
    }

    /// Fresh balance read and classification for every chain. Chains are
    /// polled concurrently; a failing chain is logged and left out.
    pub async fn monitor_all_balances(&self) -> Vec<GasWallet> {
        self.refresh_reserve_overrides().await;
        let names = self.chain_names();
        let polls = names.iter().map(|chain| self.snapshot_chain(chain));
        let results = join_all(polls).await;

        let mut wallets = Vec::with_capacity(results.len());
        for (chain, res) in names.iter().zip(results) {
            match res {
                Ok(wallet) => wallets.push(wallet),
                Err(err) => warn!(chain = %chain, error = %err, "gas balance check failed"),
            }
        }
        wallets
    }

    async fn snapshot_chain(&self, chain: &str) -> Result<GasWallet, ExecError> {
        self.invalidate_balance(chain).await;
        let wallet = self.get_gas_wallet(chain).await?;
        GAS_RESERVE_USD
            .with_label_values(&[chain])
            .set(wallet.balance_usd);
        match wallet.status {
            ReserveStatus::Healthy => debug!(
                chain = %chain,
                balance_usd = wallet.balance_usd,
                "gas reserve healthy"
            ),
            ReserveStatus::Low => warn!(
                chain = %chain,
                address = %wallet.address,
                balance_usd = wallet.balance_usd,
                "gas reserve low"
            ),
            ReserveStatus::Critical => error!(
                chain = %chain,
                address = %wallet.address,
                balance_usd = wallet.balance_usd,
                "gas reserve critical"
            ),
        }
        if let Err(err) = self.store.record_reserve_snapshot(&wallet).await {
            warn!(chain = %chain, error = %err, "persist reserve snapshot failed");
        }
        Ok(wallet)
    }

    /// One rebalancing pass over the latest monitor snapshots. Returns the
    /// attempted transfers; an overlapping call returns an empty list.
    pub async fn check_and_rebalance(&self, bridge: &dyn RebalanceBridge) -> Vec<RebalanceTransaction> {
        if self
            .rebalancing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("rebalance already running, skipping");
            return Vec::new();
        }
        let _guard = RebalanceGuard(&self.rebalancing);

        let mut balances = Vec::new();
        for chain in self.chains.keys() {
            match self.store.reserve_snapshot(chain).await {
                Ok(Some(snapshot)) => balances.push(ChainBalance {
                    chain: chain.clone(),
                    balance_usd: snapshot.balance_usd,
                    reserve: self.reserve_config(chain).await,
                }),
                Ok(None) => debug!(chain = %chain, "no reserve snapshot yet"),
                Err(err) => warn!(chain = %chain, error = %err, "reserve snapshot unavailable"),
            }
        }

        let plan = plan_rebalance(
            &balances,
            self.settings.min_rebalance_usd,
            self.settings.surplus_multiplier,
        );
        let mut attempted = Vec::new();
        for transfer in plan {
            if !chains::mutually_bridgeable(&transfer.from_chain, &transfer.to_chain) {
                info!(
                    from = %transfer.from_chain,
                    to = %transfer.to_chain,
                    amount_usd = transfer.amount_usd,
                    "cross-protocol rebalancing unsupported, skipping"
                );
                continue;
            }
            let mut tx = RebalanceTransaction::new(
                &transfer.from_chain,
                &transfer.to_chain,
                transfer.amount_usd,
            );
            tx.status = crate::gas::rebalance::RebalanceStatus::Executing;
            self.persist_rebalance(&tx).await;

            match self.bridge_usd(bridge, &transfer.from_chain, &transfer.to_chain, transfer.amount_usd).await {
                Ok(hash) => {
                    info!(
                        from = %tx.from_chain,
                        to = %tx.to_chain,
                        amount_usd = tx.amount_usd,
                        tx_hash = %hash,
                        "rebalance completed"
                    );
                    tx.succeed(hash);
                }
                Err(err) => {
                    warn!(
                        from = %tx.from_chain,
                        to = %tx.to_chain,
                        amount_usd = tx.amount_usd,
                        error = %err,
                        "rebalance failed"
                    );
                    tx.fail(err.to_string());
                }
            }
            self.invalidate_balance(&tx.from_chain).await;
            self.invalidate_balance(&tx.to_chain).await;
            self.persist_rebalance(&tx).await;
            attempted.push(tx);
        }
        attempted
    }

    async fn bridge_usd(
        &self,
        bridge: &dyn RebalanceBridge,
        from_chain: &str,
        to_chain: &str,
        amount_usd: f64,
    ) -> Result<String, ExecError> {
        let price = self.oracle.native_token_price(from_chain).await?;
        if price <= 0.0 {
            return Err(ExecError::provider("pricing", format!("non-positive price for {from_chain}")));
        }
        let amount_wei = native_to_wei(amount_usd / price);
        bridge.bridge_native(from_chain, to_chain, amount_wei).await
    }

    async fn persist_rebalance(&self, tx: &RebalanceTransaction) {
        if let Err(err) = self.store.record_rebalance(tx).await {
            warn!(id = %tx.id, error = %err, "persist rebalance log failed");
        }
    }
}

pub fn default_gas_units(step: &RouteStep) -> u64 {
    match step.step_type {
        StepType::Swap => SWAP_GAS_UNITS,
        StepType::Bridge => BRIDGE_GAS_UNITS,
        StepType::Transfer if chains::is_native_token(&step.from_chain, &step.from_token) => {
            NATIVE_TRANSFER_GAS_UNITS
        }
        StepType::Transfer => TOKEN_TRANSFER_GAS_UNITS,
    }
}
