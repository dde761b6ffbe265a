// Route types and status transitions
// This file defines the route handed over by the optimizer, its ordered steps
// and the monotonic pending -> executing -> completed/failed lifecycle
//
// Numan Thabit 2025 Nov

use crate::errors::ExecError;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    Direct,
    MultiHop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Swap,
    Bridge,
    Transfer,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Swap => "swap",
            StepType::Bridge => "bridge",
            StepType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteStatus::Pending => "pending",
            RouteStatus::Executing => "executing",
            RouteStatus::Completed => "completed",
            RouteStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One operation of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub from_chain: String,
    pub to_chain: String,
    pub from_token: String,
    pub to_token: String,
    /// Base-unit decimal string.
    pub amount: String,
    /// Preferred aggregator / bridge name.
    #[serde(default)]
    pub provider: Option<String>,
    /// Gas units.
    #[serde(default)]
    pub gas_estimate: Option<u64>,
    /// USD.
    #[serde(default)]
    pub fee: Option<f64>,
    /// Destination of transfers and receiver of bridged funds.
    #[serde(default)]
    pub recipient: Option<String>,
}

impl RouteStep {
    pub fn amount_units(&self) -> Result<U256, ExecError> {
        U256::from_str_radix(self.amount.trim(), 10).map_err(|e| {
            ExecError::invalid_route(format!("step amount {:?} is not a base-unit integer: {e}", self.amount))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub payment_intent_id: String,
    pub route_type: RouteType,
    pub steps: Vec<RouteStep>,
    #[serde(rename = "totalCostUSD")]
    pub total_cost_usd: f64,
    pub status: RouteStatus,
    #[serde(default)]
    pub execution_tx_hash: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        payment_intent_id: impl Into<String>,
        steps: Vec<RouteStep>,
        total_cost_usd: f64,
    ) -> Self {
        let route_type = if steps.len() > 1 {
            RouteType::MultiHop
        } else {
            RouteType::Direct
        };
        Self {
            id: id.into(),
            payment_intent_id: payment_intent_id.into(),
            route_type,
            steps,
            total_cost_usd,
            status: RouteStatus::Pending,
            execution_tx_hash: None,
            failure_reason: None,
        }
    }

    /// Circuit breaker key: the first step's source chain.
    pub fn circuit_key(&self) -> Option<String> {
        self.steps
            .first()
            .map(|s| format!("chain:{}", s.from_chain))
    }

    /// Structural checks before any transaction is built.
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.steps.is_empty() {
            return Err(ExecError::invalid_route("route has no steps"));
        }
        for (idx, step) in self.steps.iter().enumerate() {
            let amount = step.amount_units()?;
            if amount.is_zero() {
                return Err(ExecError::invalid_route(format!("step {idx} has zero amount")));
            }
            if step.step_type == StepType::Transfer && step.recipient.is_none() {
                return Err(ExecError::invalid_route(format!(
                    "transfer step {idx} has no recipient"
                )));
            }
            if step.step_type != StepType::Bridge && step.from_chain != step.to_chain {
                return Err(ExecError::invalid_route(format!(
                    "{} step {idx} crosses chains ({} -> {})",
                    step.step_type, step.from_chain, step.to_chain
                )));
            }
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ExecError> {
        self.transition(RouteStatus::Executing)
    }

    pub fn complete(&mut self, tx_hash: impl Into<String>) -> Result<(), ExecError> {
        self.transition(RouteStatus::Completed)?;
        self.execution_tx_hash = Some(tx_hash.into());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), ExecError> {
        self.transition(RouteStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: RouteStatus) -> Result<(), ExecError> {
        let allowed = matches!(
            (self.status, next),
            (RouteStatus::Pending, RouteStatus::Executing)
                | (RouteStatus::Pending, RouteStatus::Failed)
                | (RouteStatus::Executing, RouteStatus::Completed)
                | (RouteStatus::Executing, RouteStatus::Failed)
        );
        if !allowed {
            return Err(ExecError::invalid_route(format!(
                "route {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(step_type: StepType, amount: &str) -> RouteStep {
        RouteStep {
            step_type,
            from_chain: "arbitrum".into(),
            to_chain: if step_type == StepType::Bridge { "base".into() } else { "arbitrum".into() },
            from_token: "USDC".into(),
            to_token: "USDC".into(),
            amount: amount.into(),
            provider: None,
            gas_estimate: None,
            fee: None,
            recipient: None,
        }
    }

    #[test]
    fn status_is_monotonic() {
        let mut route = Route::new("r1", "pi1", vec![step(StepType::Swap, "100")], 1.0);
        assert_eq!(route.status, RouteStatus::Pending);
        route.start().unwrap();
        assert!(route.start().is_err(), "no reentry into executing");
        route.complete("0xabc").unwrap();
        assert!(route.fail("late").is_err());
        assert_eq!(route.status, RouteStatus::Completed);
        assert_eq!(route.execution_tx_hash.as_deref(), Some("0xabc"));
        assert!(route.failure_reason.is_none());
    }

    #[test]
    fn validation_rejects_bad_routes() {
        let empty = Route::new("r", "p", vec![], 0.0);
        assert!(empty.validate().is_err());

        let bad_amount = Route::new("r", "p", vec![step(StepType::Swap, "1.5")], 0.0);
        assert!(bad_amount.validate().is_err());

        let transfer = Route::new("r", "p", vec![step(StepType::Transfer, "10")], 0.0);
        assert!(transfer.validate().is_err(), "transfer needs a recipient");

        let ok = Route::new(
            "r",
            "p",
            vec![step(StepType::Swap, "10"), step(StepType::Bridge, "10")],
            0.0,
        );
        assert!(ok.validate().is_ok());
        assert_eq!(ok.route_type, RouteType::MultiHop);
        assert_eq!(ok.circuit_key().as_deref(), Some("chain:arbitrum"));
    }

    #[test]
    fn deserializes_optimizer_payload() {
        let json = r#"{
            "id": "route-9",
            "paymentIntentId": "pi-9",
            "routeType": "multi_hop",
            "totalCostUSD": 3.2,
            "status": "pending",
            "steps": [
                {"type": "swap", "fromChain": "polygon", "toChain": "polygon",
                 "fromToken": "POL", "toToken": "USDC", "amount": "1000000000000000000",
                 "provider": "1inch", "gasEstimate": 180000, "fee": 0.02}
            ]
        }"#;
        let route: Route = serde_json::from_str(json).unwrap();
        assert_eq!(route.route_type, RouteType::MultiHop);
        assert_eq!(route.steps[0].step_type, StepType::Swap);
        assert_eq!(route.steps[0].provider.as_deref(), Some("1inch"));
        assert_eq!(route.steps[0].gas_estimate, Some(180_000));
    }
}
