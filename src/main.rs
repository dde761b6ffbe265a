// Route engine daemon
// Wires chain RPC, gas wallets, calldata providers and the route executor
// from configuration, then runs the gas services until shutdown
//
// Numan Thabit 2025 Nov

use anyhow::{anyhow, Context, Result};
use route_engine::config::AppConfig;
use route_engine::control::{AdmissionControl, CircuitBreakers, RetryManager};
use route_engine::gas::{start_gas_services, GasAbstraction, GasServiceHandles};
use route_engine::pricing::CoinGeckoOracle;
use route_engine::router::{Dispatcher, GasBridge, RouteExecutor};
use route_engine::signing::Keyring;
use route_engine::storage::{load_reserve_overrides, ExecutionStore, MemoryStore};
use route_engine::transport::{ChainRpc, EvmJsonRpc};
use route_engine::venues::CalldataProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal route engine error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;

    let mut keyring = Keyring::new();
    let mut rpcs: HashMap<String, Arc<dyn ChainRpc>> = HashMap::new();
    let mut wallets = Vec::new();
    for (chain, chain_cfg) in &config.chains {
        let address = keyring
            .insert_hex(chain, &chain_cfg.wallet_key_hex)
            .with_context(|| format!("load gas wallet key for {chain}"))?;
        let rpc = EvmJsonRpc::new(chain.clone(), chain_cfg.rpc_url.clone())
            .with_context(|| format!("initialize RPC client for {chain}"))?;
        info!(chain = %chain, endpoint = %rpc.endpoint(), wallet = %address, "chain configured");
        rpcs.insert(chain.clone(), Arc::new(rpc));
        wallets.push((chain.clone(), address, chain_cfg.reserve));
    }

    let store = match &config.reserve_overrides_path {
        Some(path) => {
            let overrides = load_reserve_overrides(path)?;
            info!(chains = overrides.len(), "reserve overrides loaded");
            MemoryStore::new().with_reserve_overrides(overrides)
        }
        None => MemoryStore::new(),
    };
    let store: Arc<dyn ExecutionStore> = Arc::new(store);

    let oracle = CoinGeckoOracle::new(config.coingecko_url.clone(), config.coingecko_api_key.clone())
        .context("initialize price oracle")?;
    let mut gas = GasAbstraction::new(Arc::new(oracle), store.clone(), config.gas.clone());
    for (chain, address, reserve) in wallets {
        let rpc = rpcs
            .get(&chain)
            .cloned()
            .ok_or_else(|| anyhow!("rpc client missing for {chain}"))?;
        gas = gas.with_chain(&chain, rpc, address, reserve);
    }
    let gas = Arc::new(gas);
    gas.refresh_reserve_overrides().await;

    let dispatcher = Arc::new(Dispatcher::new(gas.clone(), Arc::new(keyring)).with_config(&config));
    let calldata = Arc::new(
        CalldataProvider::from_config(&config, &rpcs).context("initialize calldata providers")?,
    );

    let breakers = CircuitBreakers::new(config.circuit_breaker.clone());
    let retry = Arc::new(RetryManager::new(
        config.retry.clone(),
        breakers.clone(),
        store.clone(),
    ));
    let mut admission = AdmissionControl::new(config.max_inflight_routes, config.route_rate_per_sec);
    if let Some(wait) = config.admission_timeout() {
        admission = admission.with_queue_timeout(wait);
    }
    let executor = Arc::new(RouteExecutor::new(
        calldata.clone(),
        gas.clone(),
        dispatcher.clone(),
        retry,
        store,
        admission,
        config.slippage_tolerance_pct,
    ));

    let bridge = Arc::new(GasBridge::new(calldata.clone(), dispatcher));
    let services = start_gas_services(gas.clone(), bridge);

    info!(
        chains = ?gas.chain_names(),
        swap_providers = ?calldata.swap_providers(),
        max_inflight = config.max_inflight_routes,
        slippage_pct = config.slippage_tolerance_pct,
        "route engine online"
    );

    let app = App {
        config,
        executor,
        breakers,
        services,
    };
    app.run().await
}

struct App {
    config: AppConfig,
    executor: Arc<RouteExecutor>,
    breakers: CircuitBreakers,
    services: GasServiceHandles,
}

impl App {
    async fn run(self) -> Result<()> {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = self.executor.stats();
                    info!(
                        total_routes = stats.total_routes,
                        successful = stats.successful_routes,
                        failed = stats.failed_routes,
                        success_rate = stats.success_rate,
                        avg_route_ms = ?stats.avg_route_time_ms,
                        max_inflight = self.config.max_inflight_routes,
                        "route engine heartbeat"
                    );

                    for breaker in self.breakers.snapshots().await {
                        debug!(
                            key = %breaker.key,
                            state = %breaker.state,
                            failures = breaker.failure_count,
                            consecutive_successes = breaker.consecutive_successes,
                            "circuit breaker"
                        );
                    }
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "ctrl_c listener error");
                    }
                    info!("Shutdown signal received, stopping gas services");
                    self.services.abort();
                    break;
                }
            }
        }
        Ok(())
    }
}

fn init_tracing() -> Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
