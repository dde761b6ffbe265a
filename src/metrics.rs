// Metrics and observability module
// This file handles collection of upstream latency, step and route outcomes,
// gas reserve levels and circuit breaker transitions
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

pub static REQ_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "route_engine_request_latency_seconds",
        "latency for upstream calls",
        &["service", "method"]
    )
    .unwrap()
});

pub static REQ_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "route_engine_request_errors_total",
        "errors by upstream",
        &["service", "method"]
    )
    .unwrap()
});

pub static STEP_RESULTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "route_engine_step_results_total",
        "route step outcomes",
        &["step_type", "chain", "outcome"]
    )
    .unwrap()
});

pub static ROUTE_RESULTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "route_engine_route_results_total",
        "route outcomes",
        &["outcome"]
    )
    .unwrap()
});

pub static RETRY_ATTEMPTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "route_engine_retry_attempts_total",
        "scheduled retries by operation",
        &["operation"]
    )
    .unwrap()
});

pub static GAS_RESERVE_USD: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "route_engine_gas_reserve_usd",
        "gas wallet balance in USD as of the last monitor pass",
        &["chain"]
    )
    .unwrap()
});

pub static BREAKER_TRANSITIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "route_engine_breaker_transitions_total",
        "circuit breaker state changes",
        &["key", "state"]
    )
    .unwrap()
});
