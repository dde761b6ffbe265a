// Gas abstraction module
// This file wires together the gas wallet types, the per-chain balance and fee
// caches, reserve rebalancing and the background monitoring services
//
// Numan Thabit 2025 Nov

pub mod abstraction;
pub mod monitor;
pub mod rebalance;
pub mod wallet;

pub use abstraction::{FeeData, GasAbstraction, GasEstimate};
pub use monitor::{start_gas_services, GasServiceHandles};
pub use rebalance::{plan_rebalance, RebalanceBridge, RebalanceStatus, RebalanceTransaction};
pub use wallet::{GasReserveConfig, GasWallet, ReserveStatus};
