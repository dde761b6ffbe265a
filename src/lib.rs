// Library root module for route-engine
// This file defines the public API and module structure for the route execution engine
// It exports the executor, gas abstraction, calldata layer and retry machinery
//
// Numan Thabit 2025 Nov

pub mod chains;
pub mod config;
pub mod control;
pub mod errors;
pub mod gas;
pub mod metrics;
pub mod pricing;
pub mod router;
pub mod signing;
pub mod storage;
pub mod transport;
pub mod venues;

#[cfg(test)]
pub(crate) mod test_utils;
