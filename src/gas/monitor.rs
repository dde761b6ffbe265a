// Gas background services
// Spawns the periodic balance monitor and the rebalancing loop
//
// Numan Thabit 2025 Nov

use crate::gas::abstraction::GasAbstraction;
use crate::gas::rebalance::{RebalanceBridge, RebalanceStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub struct GasServiceHandles {
    pub monitor: JoinHandle<()>,
    pub rebalance: JoinHandle<()>,
}

impl GasServiceHandles {
    pub fn abort(&self) {
        self.monitor.abort();
        self.rebalance.abort();
    }
}

/// Monitor runs immediately and then every `monitor_interval_secs`; the
/// rebalance loop waits one full interval before its first pass.
pub fn start_gas_services(
    gas: Arc<GasAbstraction>,
    bridge: Arc<dyn RebalanceBridge>,
) -> GasServiceHandles {
    let monitor_every = Duration::from_secs(gas.settings().monitor_interval_secs.max(1));
    let rebalance_every = Duration::from_secs(gas.settings().rebalance_interval_secs.max(1));

    let monitor_gas = gas.clone();
    let monitor = tokio::spawn(async move {
        let mut ticker = interval(monitor_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let wallets = monitor_gas.monitor_all_balances().await;
            debug!(chains = wallets.len(), "gas balances refreshed");
        }
    });

    let rebalance = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + rebalance_every, rebalance_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let done = gas.check_and_rebalance(bridge.as_ref()).await;
            if !done.is_empty() {
                let failed = done
                    .iter()
                    .filter(|t| t.status == RebalanceStatus::Failed)
                    .count();
                info!(transfers = done.len(), failed = failed, "rebalance pass finished");
            }
        }
    });

    GasServiceHandles { monitor, rebalance }
}
