// Gas wallet and reserve configuration types
// This file defines the per-chain gas wallet snapshot, the reserve thresholds
// and the healthy / low / critical classification
//
// Numan Thabit 2025 Nov

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserve thresholds for one chain's gas wallet, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasReserveConfig {
    pub min_balance_usd: f64,
    pub target_balance_usd: f64,
    pub alert_threshold_usd: f64,
    pub critical_threshold_usd: f64,
}

impl GasReserveConfig {
    pub fn classify(&self, balance_usd: f64) -> ReserveStatus {
        if balance_usd < self.critical_threshold_usd {
            ReserveStatus::Critical
        } else if balance_usd < self.alert_threshold_usd {
            ReserveStatus::Low
        } else {
            ReserveStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReserveStatus {
    Healthy,
    Low,
    Critical,
}

impl fmt::Display for ReserveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReserveStatus::Healthy => "healthy",
            ReserveStatus::Low => "low",
            ReserveStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Snapshot of a chain's gas wallet as of the last confirmed balance read.
#[derive(Debug, Clone, Serialize)]
pub struct GasWallet {
    pub chain: String,
    pub address: Address,
    /// Balance in wei.
    pub balance: U256,
    pub balance_native: f64,
    pub balance_usd: f64,
    pub status: ReserveStatus,
    pub last_updated: DateTime<Utc>,
}

/// Convert a wei amount into whole native units.
pub fn wei_to_native(wei: U256) -> f64 {
    // f64 has plenty of headroom for gas-wallet sized balances
    let as_f: f64 = wei.to_string().parse().unwrap_or(0.0);
    as_f / 1e18
}

/// Convert whole native units into wei, truncating below 1 wei.
pub fn native_to_wei(amount: f64) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }
    U256::from((amount * 1e18) as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: GasReserveConfig = GasReserveConfig {
        min_balance_usd: 1_000.0,
        target_balance_usd: 3_000.0,
        alert_threshold_usd: 1_500.0,
        critical_threshold_usd: 500.0,
    };

    #[test]
    fn classification_boundaries() {
        assert_eq!(CFG.classify(499.99), ReserveStatus::Critical);
        assert_eq!(CFG.classify(500.0), ReserveStatus::Low);
        assert_eq!(CFG.classify(1_499.0), ReserveStatus::Low);
        assert_eq!(CFG.classify(1_500.0), ReserveStatus::Healthy);
        assert_eq!(CFG.classify(0.0), ReserveStatus::Critical);
    }

    #[test]
    fn wei_conversions() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u128);
        assert!((wei_to_native(one_and_half) - 1.5).abs() < 1e-12);
        assert_eq!(native_to_wei(0.25), U256::from(250_000_000_000_000_000u128));
        assert_eq!(native_to_wei(-1.0), U256::ZERO);
    }
}
