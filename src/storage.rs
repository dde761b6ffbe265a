// Execution audit trail and persisted settings
// This file defines the storage contract for route state, payment intent status,
// step transaction logs, retry logs, reserve snapshots and rebalance history
//
// Numan Thabit 2025 Nov

use crate::control::retry::RetryAttempt;
use crate::errors::ExecError;
use crate::gas::rebalance::RebalanceTransaction;
use crate::gas::wallet::{GasReserveConfig, GasWallet};
use crate::router::routes::{Route, StepType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentIntentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentRecord {
    pub status: PaymentIntentStatus,
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepTxStatus {
    Submitted,
    Confirmed,
    Failed,
}

/// One line of the per-step transaction log.
#[derive(Debug, Clone, Serialize)]
pub struct StepTxLog {
    pub payment_intent_id: String,
    pub route_id: String,
    pub step_index: usize,
    pub chain: String,
    /// None when the step failed before broadcast
    pub tx_hash: Option<String>,
    pub step_type: StepType,
    pub status: StepTxStatus,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryLog {
    pub route_id: String,
    pub payment_intent_id: String,
    #[serde(flatten)]
    pub attempt: RetryAttempt,
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save_route(&self, route: &Route) -> Result<(), ExecError>;
    async fn load_route(&self, route_id: &str) -> Result<Option<Route>, ExecError>;

    async fn set_payment_intent_status(
        &self,
        payment_intent_id: &str,
        status: PaymentIntentStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), ExecError>;
    async fn payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntentRecord>, ExecError>;

    async fn record_step_tx(&self, log: StepTxLog) -> Result<(), ExecError>;
    async fn step_txs(&self, payment_intent_id: &str) -> Result<Vec<StepTxLog>, ExecError>;

    async fn record_retry(&self, log: RetryLog) -> Result<(), ExecError>;
    async fn retries(&self, route_id: &str) -> Result<Vec<RetryLog>, ExecError>;

    /// Latest monitor snapshot per chain.
    async fn record_reserve_snapshot(&self, wallet: &GasWallet) -> Result<(), ExecError>;
    async fn reserve_snapshot(&self, chain: &str) -> Result<Option<GasWallet>, ExecError>;

    /// Upsert by rebalance id.
    async fn record_rebalance(&self, tx: &RebalanceTransaction) -> Result<(), ExecError>;
    async fn rebalances(&self) -> Result<Vec<RebalanceTransaction>, ExecError>;

    async fn reserve_overrides(&self) -> Result<HashMap<String, GasReserveConfig>, ExecError>;
}

/// In-process store. Every collection sits behind its own lock.
#[derive(Default)]
pub struct MemoryStore {
    routes: RwLock<HashMap<String, Route>>,
    intents: RwLock<HashMap<String, PaymentIntentRecord>>,
    /// Keyed by payment intent id, in recording order
    step_txs: RwLock<HashMap<String, Vec<StepTxLog>>>,
    /// Keyed by route id, in recording order
    retries: RwLock<HashMap<String, Vec<RetryLog>>>,
    snapshots: RwLock<HashMap<String, GasWallet>>,
    rebalances: RwLock<Vec<RebalanceTransaction>>,
    overrides: RwLock<HashMap<String, GasReserveConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserve_overrides(self, overrides: HashMap<String, GasReserveConfig>) -> Self {
        Self {
            overrides: RwLock::new(overrides),
            ..self
        }
    }

    pub async fn set_reserve_override(&self, chain: &str, reserve: GasReserveConfig) {
        self.overrides
            .write()
            .await
            .insert(chain.to_string(), reserve);
    }
}

/// Read `chain -> GasReserveConfig` overrides from a YAML file.
pub fn load_reserve_overrides(path: &Path) -> Result<HashMap<String, GasReserveConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read reserve overrides {}", path.display()))?;
    parse_reserve_overrides(&raw)
        .with_context(|| format!("parse reserve overrides {}", path.display()))
}

fn parse_reserve_overrides(raw: &str) -> Result<HashMap<String, GasReserveConfig>> {
    let parsed: HashMap<String, GasReserveConfig> = serde_yaml::from_str(raw)?;
    Ok(parsed
        .into_iter()
        .map(|(chain, cfg)| (chain.to_ascii_lowercase(), cfg))
        .collect())
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn save_route(&self, route: &Route) -> Result<(), ExecError> {
        self.routes
            .write()
            .await
            .insert(route.id.clone(), route.clone());
        Ok(())
    }

    async fn load_route(&self, route_id: &str) -> Result<Option<Route>, ExecError> {
        Ok(self.routes.read().await.get(route_id).cloned())
    }

    async fn set_payment_intent_status(
        &self,
        payment_intent_id: &str,
        status: PaymentIntentStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), ExecError> {
        self.intents.write().await.insert(
            payment_intent_id.to_string(),
            PaymentIntentRecord {
                status,
                failure_reason: failure_reason.map(str::to_string),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntentRecord>, ExecError> {
        Ok(self.intents.read().await.get(payment_intent_id).cloned())
    }

    async fn record_step_tx(&self, log: StepTxLog) -> Result<(), ExecError> {
        self.step_txs
            .write()
            .await
            .entry(log.payment_intent_id.clone())
            .or_default()
            .push(log);
        Ok(())
    }

    async fn step_txs(&self, payment_intent_id: &str) -> Result<Vec<StepTxLog>, ExecError> {
        Ok(self
            .step_txs
            .read()
            .await
            .get(payment_intent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_retry(&self, log: RetryLog) -> Result<(), ExecError> {
        self.retries
            .write()
            .await
            .entry(log.route_id.clone())
            .or_default()
            .push(log);
        Ok(())
    }

    async fn retries(&self, route_id: &str) -> Result<Vec<RetryLog>, ExecError> {
        Ok(self
            .retries
            .read()
            .await
            .get(route_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_reserve_snapshot(&self, wallet: &GasWallet) -> Result<(), ExecError> {
        self.snapshots
            .write()
            .await
            .insert(wallet.chain.clone(), wallet.clone());
        Ok(())
    }

    async fn reserve_snapshot(&self, chain: &str) -> Result<Option<GasWallet>, ExecError> {
        Ok(self.snapshots.read().await.get(chain).cloned())
    }

    async fn record_rebalance(&self, tx: &RebalanceTransaction) -> Result<(), ExecError> {
        let mut log = self.rebalances.write().await;
        match log.iter_mut().find(|r| r.id == tx.id) {
            Some(existing) => *existing = tx.clone(),
            None => log.push(tx.clone()),
        }
        Ok(())
    }

    async fn rebalances(&self) -> Result<Vec<RebalanceTransaction>, ExecError> {
        Ok(self.rebalances.read().await.clone())
    }

    async fn reserve_overrides(&self) -> Result<HashMap<String, GasReserveConfig>, ExecError> {
        Ok(self.overrides.read().await.clone())
    }
}
