// Gas reserve rebalancing plan
// This file pairs chains below their minimum reserve with chains holding
// surplus gas and describes the resulting bridge transfers
//
// Numan Thabit 2025 Nov

use crate::errors::ExecError;
use crate::gas::wallet::GasReserveConfig;
use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceTransaction {
    pub id: String,
    pub from_chain: String,
    pub to_chain: String,
    pub amount_usd: f64,
    pub status: RebalanceStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RebalanceTransaction {
    pub fn new(from_chain: &str, to_chain: &str, amount_usd: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_chain: from_chain.to_string(),
            to_chain: to_chain.to_string(),
            amount_usd,
            status: RebalanceStatus::Pending,
            tx_hash: None,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn succeed(&mut self, tx_hash: String) {
        self.status = RebalanceStatus::Completed;
        self.tx_hash = Some(tx_hash);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: String) {
        self.status = RebalanceStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }
}

/// Moves native gas between two chains' gas wallets and returns the
/// confirmed source-chain transaction hash.
#[async_trait]
pub trait RebalanceBridge: Send + Sync {
    async fn bridge_native(
        &self,
        from_chain: &str,
        to_chain: &str,
        amount_wei: U256,
    ) -> Result<String, ExecError>;
}

/// Planner input, from the latest monitor snapshot.
#[derive(Debug, Clone)]
pub struct ChainBalance {
    pub chain: String,
    pub balance_usd: f64,
    pub reserve: GasReserveConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTransfer {
    pub from_chain: String,
    pub to_chain: String,
    pub amount_usd: f64,
}

/// Greedy pairing: the neediest chain is served first from the largest
/// surplus. Pairs below `min_transfer_usd` are skipped.
pub fn plan_rebalance(
    balances: &[ChainBalance],
    min_transfer_usd: f64,
    surplus_multiplier: f64,
) -> Vec<PlannedTransfer> {
    let mut needing: Vec<(String, f64)> = balances
        .iter()
        .filter(|b| b.balance_usd < b.reserve.min_balance_usd)
        .map(|b| (b.chain.clone(), b.reserve.target_balance_usd - b.balance_usd))
        .collect();
    let mut surplus: Vec<(String, f64)> = balances
        .iter()
        .filter(|b| b.balance_usd > surplus_multiplier * b.reserve.target_balance_usd)
        .map(|b| (b.chain.clone(), b.balance_usd - b.reserve.target_balance_usd))
        .collect();
    needing.sort_by(|a, b| b.1.total_cmp(&a.1));
    surplus.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut plan = Vec::new();
    for (to_chain, needed) in needing.iter_mut() {
        for (from_chain, available) in surplus.iter_mut() {
            if *needed <= 0.0 {
                break;
            }
            if *available <= 0.0 || *from_chain == *to_chain {
                continue;
            }
            let amount = needed.min(*available);
            if amount < min_transfer_usd {
                continue;
            }
            plan.push(PlannedTransfer {
                from_chain: from_chain.clone(),
                to_chain: to_chain.clone(),
                amount_usd: amount,
            });
            *needed -= amount;
            *available -= amount;
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bal(chain: &str, usd: f64, min: f64, target: f64) -> ChainBalance {
        ChainBalance {
            chain: chain.into(),
            balance_usd: usd,
            reserve: GasReserveConfig {
                min_balance_usd: min,
                target_balance_usd: target,
                alert_threshold_usd: min * 1.5,
                critical_threshold_usd: min / 2.0,
            },
        }
    }

    #[test]
    fn surplus_chain_funds_needy_chain() {
        let plan = plan_rebalance(
            &[
                bal("ethereum", 50_000.0, 1_000.0, 10_000.0),
                bal("arbitrum", 80.0, 1_000.0, 3_000.0),
            ],
            100.0,
            1.5,
        );
        assert_eq!(
            plan,
            vec![PlannedTransfer {
                from_chain: "ethereum".into(),
                to_chain: "arbitrum".into(),
                amount_usd: 2_920.0,
            }]
        );
    }

    #[test]
    fn splits_need_across_surplus_chains() {
        let plan = plan_rebalance(
            &[
                bal("base", 10.0, 200.0, 1_000.0),
                bal("optimism", 1_700.0, 200.0, 1_000.0),
                bal("arbitrum", 1_600.0, 200.0, 1_000.0),
            ],
            100.0,
            1.5,
        );
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].from_chain, "optimism");
        assert_eq!(plan[0].amount_usd, 700.0);
        assert_eq!(plan[1].from_chain, "arbitrum");
        assert_eq!(plan[1].amount_usd, 290.0);
    }

    #[test]
    fn floor_and_thresholds() {
        // needs 70, under the floor even with 550 of surplus
        let plan = plan_rebalance(
            &[
                bal("base", 150.0, 200.0, 220.0),
                bal("optimism", 1_550.0, 200.0, 1_000.0),
            ],
            100.0,
            1.5,
        );
        assert!(plan.is_empty());

        // exactly 1.5x target is not surplus
        let plan = plan_rebalance(
            &[
                bal("base", 0.0, 200.0, 1_000.0),
                bal("optimism", 1_500.0, 200.0, 1_000.0),
            ],
            100.0,
            1.5,
        );
        assert!(plan.is_empty());
    }
}
