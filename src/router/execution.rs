// Route executor - drives a route's steps to completion, one transaction at a time
// This file implements the execution plane: per-step transaction building,
// submission and confirmation, with route-level retry and circuit breaking
//
// Numan Thabit 2025 Nov

use crate::chains;
use crate::control::{AdmissionControl, RetryManager};
use crate::errors::{ErrorCode, ExecError};
use crate::gas::{GasAbstraction, GasEstimate, GasWallet};
use crate::metrics::{ROUTE_RESULTS, STEP_RESULTS};
use crate::router::dispatch::{Dispatcher, TxRequest};
use crate::router::routes::{Route, RouteStatus, RouteStep, StepType};
use crate::storage::{ExecutionStore, PaymentIntentStatus, StepTxLog, StepTxStatus};
use crate::venues::CalldataProvider;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use chrono::Utc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// Execution statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionStats {
    pub total_routes: u64,
    pub successful_routes: u64,
    pub failed_routes: u64,
    pub avg_route_time_ms: Option<f64>,
    pub success_rate: f64,
}

pub struct RouteExecutor {
    calldata: Arc<CalldataProvider>,
    gas: Arc<GasAbstraction>,
    dispatcher: Arc<Dispatcher>,
    retry: Arc<RetryManager>,
    store: Arc<dyn ExecutionStore>,
    admission: AdmissionControl,
    slippage_pct: f64,
    total_routes: AtomicU64,
    successful_routes: AtomicU64,
    failed_routes: AtomicU64,
    /// Sum of successful route times, microseconds
    total_route_time_us: AtomicU64,
}

/// How `submit` reads the gas wallet. Inside a route the route-level retry
/// is the only retry layer, so reads there are not retried again.
#[derive(Clone, Copy)]
enum GasReads {
    Direct,
    Retried,
}

/// Where a step's log lines go.
struct StepContext<'a> {
    route_id: &'a str,
    payment_intent_id: &'a str,
    index: usize,
}

impl RouteExecutor {
    pub fn new(
        calldata: Arc<CalldataProvider>,
        gas: Arc<GasAbstraction>,
        dispatcher: Arc<Dispatcher>,
        retry: Arc<RetryManager>,
        store: Arc<dyn ExecutionStore>,
        admission: AdmissionControl,
        slippage_pct: f64,
    ) -> Self {
        Self {
            calldata,
            gas,
            dispatcher,
            retry,
            store,
            admission,
            slippage_pct,
            total_routes: AtomicU64::new(0),
            successful_routes: AtomicU64::new(0),
            failed_routes: AtomicU64::new(0),
            total_route_time_us: AtomicU64::new(0),
        }
    }

    pub fn retry_manager(&self) -> &RetryManager {
        &self.retry
    }

    pub fn stats(&self) -> ExecutionStats {
        let total = self.total_routes.load(Ordering::Relaxed);
        let successful = self.successful_routes.load(Ordering::Relaxed);
        let failed = self.failed_routes.load(Ordering::Relaxed);
        let total_ms = self.total_route_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        ExecutionStats {
            total_routes: total,
            successful_routes: successful,
            failed_routes: failed,
            avg_route_time_ms: if successful > 0 {
                Some(total_ms / successful as f64)
            } else {
                None
            },
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Execute `route` for `payment_intent_id` and return the last step's
    /// transaction hash. Steps run strictly in order; a failed step is resumed
    /// in place after the retry manager's delay, never re-running confirmed
    /// steps. An open circuit on the route's chain returns `CircuitOpen` and
    /// leaves the route pending.
    #[tracing::instrument(skip_all, fields(route_id = %route.id, steps = route.steps.len()))]
    pub async fn execute_route(
        &self,
        route: &mut Route,
        payment_intent_id: &str,
    ) -> Result<String, ExecError> {
        if route.status != RouteStatus::Pending {
            return Err(ExecError::invalid_route(format!(
                "route {} is {}, expected pending",
                route.id, route.status
            )));
        }
        if let Err(err) = route.validate() {
            self.retry
                .fail_route(route, payment_intent_id, &err.to_string())
                .await;
            ROUTE_RESULTS.with_label_values(&["invalid"]).inc();
            return Err(err);
        }
        let key = route.circuit_key().unwrap_or_default();
        if !self.retry.breakers().can_execute(&key).await {
            warn!(key = %key, "circuit open, route left pending");
            ROUTE_RESULTS.with_label_values(&["circuit_open"]).inc();
            return Err(ExecError::CircuitOpen { key });
        }

        let _permit = self.admission.acquire().await?;
        route.start()?;
        self.persist_route(route).await;
        self.set_intent(payment_intent_id, PaymentIntentStatus::Processing, None)
            .await;
        self.total_routes.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        info!(payment_intent_id = %payment_intent_id, "route execution started");

        let mut next = 0usize;
        let mut attempt = 0u32;
        // broadcast but unconfirmed hash of step `next`
        let mut in_flight: Option<B256> = None;
        let mut last_hash = None;
        while next < route.steps.len() {
            let step = route.steps[next].clone();
            let ctx = StepContext {
                route_id: &route.id,
                payment_intent_id,
                index: next,
            };
            match self.run_step(&ctx, &step, &mut in_flight).await {
                Ok(hash) => {
                    last_hash = Some(hash);
                    next += 1;
                }
                Err(err) => match self.retry.retry(route, payment_intent_id, err, attempt).await {
                    Ok(delay) => {
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => {
                        self.failed_routes.fetch_add(1, Ordering::Relaxed);
                        ROUTE_RESULTS.with_label_values(&["failed"]).inc();
                        return Err(err);
                    }
                },
            }
        }

        let final_hash = match last_hash {
            Some(hash) => hash.to_string(),
            None => return Err(ExecError::invalid_route("route has no steps")),
        };
        route.complete(final_hash.clone())?;
        self.persist_route(route).await;
        self.set_intent(payment_intent_id, PaymentIntentStatus::Completed, None)
            .await;
        self.retry.breakers().record_success(&key).await;

        let elapsed = started.elapsed();
        self.successful_routes.fetch_add(1, Ordering::Relaxed);
        self.total_route_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        ROUTE_RESULTS.with_label_values(&["completed"]).inc();
        info!(
            payment_intent_id = %payment_intent_id,
            tx_hash = %final_hash,
            elapsed_ms = elapsed.as_millis() as u64,
            "route completed"
        );
        Ok(final_hash)
    }

    /// Submit (unless already broadcast) and confirm one route step.
    async fn run_step(
        &self,
        ctx: &StepContext<'_>,
        step: &RouteStep,
        in_flight: &mut Option<B256>,
    ) -> Result<B256, ExecError> {
        let hash = match *in_flight {
            Some(hash) => {
                debug!(step = ctx.index, tx_hash = %hash, "re-waiting on broadcast step");
                hash
            }
            None => match self.submit(step, GasReads::Direct).await {
                Ok(hash) => {
                    *in_flight = Some(hash);
                    self.log_step(ctx, step, Some(hash), StepTxStatus::Submitted, None)
                        .await;
                    hash
                }
                Err(err) => {
                    self.log_step(ctx, step, None, StepTxStatus::Failed, Some(&err))
                        .await;
                    return Err(err);
                }
            },
        };

        match self.dispatcher.confirm(&step.from_chain, hash).await {
            Ok(_) => {
                *in_flight = None;
                self.log_step(ctx, step, Some(hash), StepTxStatus::Confirmed, None)
                    .await;
                Ok(hash)
            }
            Err(err) => {
                // a reverted transaction is final; anything else is re-awaited
                if err.code() == Some(ErrorCode::ContractError) {
                    *in_flight = None;
                }
                self.log_step(ctx, step, Some(hash), StepTxStatus::Failed, Some(&err))
                    .await;
                Err(err)
            }
        }
    }

    /// Build, sign, submit and confirm a single step outside any route. The
    /// gas wallet and estimate reads run under `execute_with_retry`.
    pub async fn execute_step(&self, step: &RouteStep) -> Result<String, ExecError> {
        let outcome = async {
            let hash = self.submit(step, GasReads::Retried).await?;
            self.dispatcher.confirm(&step.from_chain, hash).await?;
            Ok::<_, ExecError>(hash)
        }
        .await;
        let label = if outcome.is_ok() { "confirmed" } else { "failed" };
        STEP_RESULTS
            .with_label_values(&[step.step_type.as_str(), step.from_chain.as_str(), label])
            .inc();
        outcome.map(|hash| hash.to_string())
    }

    async fn gas_reads(&self, step: &RouteStep, reads: GasReads) -> Result<(GasWallet, GasEstimate), ExecError> {
        let chain = step.from_chain.as_str();
        match reads {
            GasReads::Direct => {
                let wallet = self.gas.get_gas_wallet(chain).await?;
                let estimate = self.gas.estimate_gas(step).await?;
                Ok((wallet, estimate))
            }
            GasReads::Retried => {
                let key = format!("chain:{chain}");
                let wallet = self
                    .retry
                    .execute_with_retry("get_gas_wallet", &key, |_| self.gas.get_gas_wallet(chain))
                    .await?;
                let estimate = self
                    .retry
                    .execute_with_retry("estimate_gas", &key, |_| self.gas.estimate_gas(step))
                    .await?;
                Ok((wallet, estimate))
            }
        }
    }

    async fn submit(&self, step: &RouteStep, reads: GasReads) -> Result<B256, ExecError> {
        let chain = step.from_chain.as_str();
        let (wallet, estimate) = self.gas_reads(step, reads).await?;
        let cost = U256::from(estimate.gas_units) * U256::from(estimate.gas_price);
        if wallet.balance < cost {
            return Err(ExecError::coded(
                ErrorCode::InsufficientFundsForGas,
                format!(
                    "gas wallet on {chain} holds {} native, step needs ~{}",
                    wallet.balance_native, estimate.cost_native
                ),
            ));
        }

        let req = self.build_transaction(step, wallet.address).await?;
        let hash = self.dispatcher.send(&req).await?;
        STEP_RESULTS
            .with_label_values(&[step.step_type.as_str(), chain, "submitted"])
            .inc();
        info!(
            chain = %chain,
            step_type = %step.step_type,
            tx_hash = %hash,
            gas_units = estimate.gas_units,
            cost_usd = estimate.cost_usd,
            "step submitted"
        );
        Ok(hash)
    }

    /// Transaction for `step` sent from `from`.
    pub async fn build_transaction(&self, step: &RouteStep, from: Address) -> Result<TxRequest, ExecError> {
        let chain = step.from_chain.clone();
        let amount = step.amount_units()?;
        match step.step_type {
            StepType::Swap => {
                let cd = self
                    .calldata
                    .get_swap_calldata(step, from, self.slippage_pct)
                    .await?;
                let value = if chains::is_native_token(&step.from_chain, &step.from_token) {
                    amount
                } else {
                    U256::ZERO
                };
                Ok(TxRequest {
                    chain,
                    to: cd.to,
                    data: cd.data,
                    value,
                    gas_limit: cd.gas_limit,
                })
            }
            StepType::Bridge => {
                let cd = self.calldata.get_bridge_calldata(step, from).await?;
                Ok(TxRequest {
                    chain,
                    to: cd.to,
                    data: cd.data,
                    value: cd.value,
                    gas_limit: cd.gas_limit,
                })
            }
            StepType::Transfer => {
                let raw = step
                    .recipient
                    .as_deref()
                    .ok_or_else(|| ExecError::invalid_route("transfer step without recipient"))?;
                let recipient = Address::from_str(raw)
                    .map_err(|e| ExecError::invalid_route(format!("bad recipient {raw}: {e}")))?;
                if chains::is_native_token(&step.from_chain, &step.from_token) {
                    return Ok(TxRequest {
                        chain,
                        to: recipient,
                        data: Bytes::new(),
                        value: amount,
                        gas_limit: None,
                    });
                }
                let token = chains::token_address(&step.from_chain, &step.from_token).ok_or_else(|| {
                    ExecError::invalid_route(format!(
                        "unknown token {} on {}",
                        step.from_token, step.from_chain
                    ))
                })?;
                let data = IERC20::transferCall {
                    to: recipient,
                    amount,
                }
                .abi_encode();
                Ok(TxRequest {
                    chain,
                    to: token,
                    data: Bytes::from(data),
                    value: U256::ZERO,
                    gas_limit: None,
                })
            }
        }
    }

    async fn log_step(
        &self,
        ctx: &StepContext<'_>,
        step: &RouteStep,
        tx_hash: Option<B256>,
        status: StepTxStatus,
        err: Option<&ExecError>,
    ) {
        if status != StepTxStatus::Submitted {
            let outcome = if status == StepTxStatus::Confirmed { "confirmed" } else { "failed" };
            STEP_RESULTS
                .with_label_values(&[step.step_type.as_str(), step.from_chain.as_str(), outcome])
                .inc();
        }
        let log = StepTxLog {
            payment_intent_id: ctx.payment_intent_id.to_string(),
            route_id: ctx.route_id.to_string(),
            step_index: ctx.index,
            chain: step.from_chain.clone(),
            tx_hash: tx_hash.map(|h| h.to_string()),
            step_type: step.step_type,
            status,
            error: err.map(|e| e.to_string()),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.store.record_step_tx(log).await {
            warn!(route_id = %ctx.route_id, step = ctx.index, error = %e, "persist step log failed");
        }
    }

    async fn persist_route(&self, route: &Route) {
        if let Err(err) = self.store.save_route(route).await {
            warn!(route_id = %route.id, error = %err, "persist route failed");
        }
    }

    async fn set_intent(&self, payment_intent_id: &str, status: PaymentIntentStatus, reason: Option<&str>) {
        if let Err(err) = self
            .store
            .set_payment_intent_status(payment_intent_id, status, reason)
            .await
        {
            warn!(payment_intent_id = %payment_intent_id, error = %err, "persist payment intent failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerConfig, GasConfig, RetryConfig};
    use crate::control::{CircuitBreakers, CircuitState};
    use crate::router::dispatch::ChainSettings;
    use crate::pricing::StaticPriceOracle;
    use crate::storage::MemoryStore;
    use crate::test_utils::{keyring, EventLog, MockRpc, MockSwapProvider, ANVIL_ADDRESS};
    use crate::venues::ZERO_X;
    use alloy::primitives::keccak256;
    use std::time::Duration;

    const RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";

    struct Harness {
        executor: RouteExecutor,
        store: Arc<MemoryStore>,
        breakers: CircuitBreakers,
    }

    fn harness(rpcs: Vec<(&str, Arc<MockRpc>)>, swaps: Vec<Arc<MockSwapProvider>>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(
            StaticPriceOracle::new()
                .with_price("ETH", 2_000.0)
                .with_price("POL", 0.5)
                .with_price("XDAI", 1.0),
        );
        let mut gas = GasAbstraction::new(oracle, store.clone(), GasConfig::default());
        let mut names = Vec::new();
        for (chain, rpc) in rpcs {
            gas = gas.with_chain(chain, rpc, ANVIL_ADDRESS, None);
            names.push(chain);
        }
        let gas = Arc::new(gas);
        let mut dispatcher = Dispatcher::new(gas.clone(), Arc::new(keyring(&names)));
        for chain in &names {
            dispatcher = dispatcher.with_chain_settings(
                chain,
                ChainSettings {
                    confirmations: 1,
                    confirmation_timeout: Duration::from_secs(20),
                },
            );
        }
        let dispatcher = Arc::new(dispatcher);
        let breakers = CircuitBreakers::new(BreakerConfig::default());
        let retry = Arc::new(RetryManager::new(
            RetryConfig::default(),
            breakers.clone(),
            store.clone(),
        ));
        let swaps = swaps
            .into_iter()
            .map(|s| s as Arc<dyn crate::venues::SwapProvider>)
            .collect();
        let executor = RouteExecutor::new(
            Arc::new(CalldataProvider::new(swaps, vec![])),
            gas,
            dispatcher,
            retry,
            store.clone(),
            AdmissionControl::new(4, None),
            0.5,
        );
        Harness {
            executor,
            store,
            breakers,
        }
    }

    fn transfer(chain: &str, token: &str) -> RouteStep {
        RouteStep {
            step_type: StepType::Transfer,
            from_chain: chain.into(),
            to_chain: chain.into(),
            from_token: token.into(),
            to_token: token.into(),
            amount: "1000000".into(),
            provider: None,
            gas_estimate: None,
            fee: None,
            recipient: Some(RECIPIENT.into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn steps_run_in_order() {
        let events = EventLog::default();
        let arb = Arc::new(MockRpc::new().labeled("arbitrum", &events));
        let base = Arc::new(MockRpc::new().labeled("base", &events));
        let h = harness(vec![("arbitrum", arb), ("base", base)], vec![]);

        let mut route = Route::new(
            "r-1",
            "pi-1",
            vec![transfer("arbitrum", "ETH"), transfer("base", "USDC")],
            1.0,
        );
        let hash = h.executor.execute_route(&mut route, "pi-1").await.unwrap();

        assert_eq!(
            events.snapshot(),
            vec!["arbitrum:send", "arbitrum:confirmed", "base:send", "base:confirmed"]
        );
        assert_eq!(route.status, RouteStatus::Completed);
        assert_eq!(route.execution_tx_hash.as_deref(), Some(hash.as_str()));
        let intent = h.store.payment_intent("pi-1").await.unwrap().unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::Completed);

        let logs = h.store.step_txs("pi-1").await.unwrap();
        let statuses: Vec<_> = logs.iter().map(|l| (l.step_index, l.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (0, StepTxStatus::Submitted),
                (0, StepTxStatus::Confirmed),
                (1, StepTxStatus::Submitted),
                (1, StepTxStatus::Confirmed),
            ]
        );
        let stats = h.executor.stats();
        assert_eq!(stats.successful_routes, 1);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_leaves_route_pending() {
        let rpc = Arc::new(MockRpc::new());
        let h = harness(vec![("polygon", rpc.clone())], vec![]);
        for _ in 0..5 {
            h.breakers.record_failure("chain:polygon").await;
        }
        let mut route = Route::new("r-2", "pi-2", vec![transfer("polygon", "POL")], 1.0);
        let err = h.executor.execute_route(&mut route, "pi-2").await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(route.status, RouteStatus::Pending);
        assert_eq!(rpc.sent_count(), 0);
        assert!(h.store.payment_intent("pi-2").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slippage_failure_is_permanent() {
        let rpc = Arc::new(MockRpc::new());
        let zerox = Arc::new(MockSwapProvider::failing(ZERO_X, "Too little received"));
        let h = harness(vec![("base", rpc.clone())], vec![zerox.clone()]);
        let mut step = transfer("base", "ETH");
        step.step_type = StepType::Swap;
        step.to_token = "USDC".into();
        let mut route = Route::new("r-3", "pi-3", vec![step], 1.0);

        let err = h.executor.execute_route(&mut route, "pi-3").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::SlippageExceeded));
        assert_eq!(zerox.calls(), 1, "no retry for slippage");
        assert_eq!(route.status, RouteStatus::Failed);
        assert!(route.failure_reason.as_deref().unwrap().contains("Too little received"));
        let intent = h.store.payment_intent("pi-3").await.unwrap().unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::Failed);
        let retries = h.store.retries("r-3").await.unwrap();
        assert_eq!(retries.len(), 1);
        assert!(!retries[0].attempt.will_retry);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_send_error_resumes_same_step() {
        let events = EventLog::default();
        let rpc = Arc::new(MockRpc::new().labeled("base", &events));
        rpc.push_send_error(ExecError::Transport("ECONNRESET".into()));
        let h = harness(vec![("base", rpc.clone())], vec![]);
        let mut route = Route::new("r-4", "pi-4", vec![transfer("base", "ETH")], 1.0);

        h.executor.execute_route(&mut route, "pi-4").await.unwrap();
        assert_eq!(route.status, RouteStatus::Completed);
        assert_eq!(events.snapshot(), vec!["base:send", "base:confirmed"]);
        let retries = h.store.retries("r-4").await.unwrap();
        assert_eq!(retries.len(), 1);
        assert!(retries[0].attempt.will_retry);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_rewaits_without_rebroadcast() {
        // 12 empty polls cannot fit in one 20s wait
        let rpc = Arc::new(MockRpc::new().with_receipt_after_polls(12));
        let h = harness(vec![("base", rpc.clone())], vec![]);
        let mut route = Route::new("r-5", "pi-5", vec![transfer("base", "ETH")], 1.0);

        h.executor.execute_route(&mut route, "pi-5").await.unwrap();
        assert_eq!(rpc.sent_count(), 1);
        assert_eq!(route.status, RouteStatus::Completed);
        let retries = h.store.retries("r-5").await.unwrap();
        assert!(!retries.is_empty());
        assert!(retries[0].attempt.error.contains("TIMEOUT"));
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_step_fails_route() {
        let rpc = Arc::new(MockRpc::new().with_revert());
        let h = harness(vec![("base", rpc.clone())], vec![]);
        let mut route = Route::new("r-6", "pi-6", vec![transfer("base", "ETH")], 1.0);
        let err = h.executor.execute_route(&mut route, "pi-6").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ContractError));
        assert_eq!(rpc.sent_count(), 1);
        assert_eq!(route.status, RouteStatus::Failed);
        assert_eq!(h.executor.stats().failed_routes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_bad_routes() {
        let h = harness(vec![("base", Arc::new(MockRpc::new()))], vec![]);
        let mut empty = Route::new("r-7", "pi-7", vec![], 0.0);
        let err = h.executor.execute_route(&mut empty, "pi-7").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidRoute));
        assert_eq!(empty.status, RouteStatus::Failed);

        let mut done = Route::new("r-8", "pi-8", vec![transfer("base", "ETH")], 0.0);
        done.status = RouteStatus::Completed;
        assert!(h.executor.execute_route(&mut done, "pi-8").await.is_err());
        assert_eq!(done.status, RouteStatus::Completed);
    }

    #[tokio::test]
    async fn builds_transfers_and_swaps() {
        let swap = Arc::new(MockSwapProvider::new(ZERO_X));
        let h = harness(vec![("base", Arc::new(MockRpc::new()))], vec![swap]);
        let from = ANVIL_ADDRESS;

        let native = h.executor.build_transaction(&transfer("base", "ETH"), from).await.unwrap();
        assert_eq!(native.to, Address::from_str(RECIPIENT).unwrap());
        assert_eq!(native.value, U256::from(1_000_000u64));
        assert!(native.data.is_empty());

        let token = h.executor.build_transaction(&transfer("base", "USDC"), from).await.unwrap();
        assert_eq!(
            token.to,
            Address::from_str("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap()
        );
        assert_eq!(token.value, U256::ZERO);
        assert_eq!(&token.data[..4], IERC20::transferCall::SELECTOR.as_slice());

        let mut step = transfer("base", "USDC");
        step.step_type = StepType::Swap;
        step.to_token = "ETH".into();
        let erc20_in = h.executor.build_transaction(&step, from).await.unwrap();
        assert_eq!(erc20_in.value, U256::ZERO);
        step.from_token = "ETH".into();
        let native_in = h.executor.build_transaction(&step, from).await.unwrap();
        assert_eq!(native_in.value, U256::from(1_000_000u64));
        assert_eq!(native_in.to, MockSwapProvider::ROUTER);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_step_returns_broadcast_hash() {
        let rpc = Arc::new(MockRpc::new());
        let h = harness(vec![("base", rpc.clone())], vec![]);
        let hash = h.executor.execute_step(&transfer("base", "ETH")).await.unwrap();
        let sent = rpc.last_raw().unwrap();
        assert_eq!(hash, keccak256(&sent).to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_chain_counts_one_breaker_failure() {
        let rpc = Arc::new(MockRpc::new().failing_reads());
        let h = harness(vec![("base", rpc.clone())], vec![]);
        let mut route = Route::new("r-9", "pi-9", vec![transfer("base", "ETH")], 1.0);

        let err = h.executor.execute_route(&mut route, "pi-9").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NetworkError));
        assert_eq!(route.status, RouteStatus::Failed);
        assert_eq!(rpc.balance_reads(), 4, "one read per route attempt");
        assert_eq!(h.store.retries("r-9").await.unwrap().len(), 4);

        let breaker = h.breakers.snapshot("chain:base").await.unwrap();
        assert_eq!(breaker.state, CircuitState::Closed);
        assert_eq!(breaker.failure_count, 1);

        let mut next = Route::new("r-10", "pi-10", vec![transfer("base", "ETH")], 1.0);
        let err = h.executor.execute_route(&mut next, "pi-10").await.unwrap_err();
        assert!(!err.is_circuit_open());
        assert_eq!(next.status, RouteStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_step_is_counted_once() {
        let rpc = Arc::new(MockRpc::new());
        let h = harness(vec![("gnosis", rpc.clone())], vec![]);
        let counter = |outcome: &str| {
            STEP_RESULTS
                .with_label_values(&["transfer", "gnosis", outcome])
                .get()
        };
        let failed_before = counter("failed");

        let mut step = transfer("gnosis", "XDAI");
        step.recipient = Some("not-an-address".into());
        let mut route = Route::new("r-11", "pi-11", vec![step], 1.0);
        let err = h.executor.execute_route(&mut route, "pi-11").await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::InvalidRoute));
        assert_eq!(counter("failed") - failed_before, 1.0);
        assert_eq!(counter("submitted"), 0.0);
        assert_eq!(rpc.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_gas_wallet_is_retryable() {
        let rpc = Arc::new(MockRpc::new().with_balance(U256::ZERO));
        let h = harness(vec![("base", rpc.clone())], vec![]);
        let err = h.executor.execute_step(&transfer("base", "ETH")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InsufficientFundsForGas));
        assert!(crate::errors::is_retryable(&err));
        assert_eq!(rpc.sent_count(), 0);
    }
}
