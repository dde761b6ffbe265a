// Router module - route model and execution plane
// This file wires the route types, the transaction dispatcher, the route
// executor and the gas rebalance bridge
//
// Numan Thabit 2025 Nov

pub mod bridge;
pub mod dispatch;
pub mod execution;
pub mod routes;

pub use bridge::GasBridge;
pub use dispatch::{ChainSettings, Dispatcher, TxRequest};
pub use execution::{ExecutionStats, RouteExecutor};
pub use routes::{Route, RouteStatus, RouteStep, RouteType, StepType};
