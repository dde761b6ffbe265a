// Calldata provider module
// This file selects swap aggregators and bridge protocols in priority order,
// fails over between them and normalizes every answer into one calldata shape
//
// Numan Thabit 2025 Nov

pub mod lifi;
pub mod oneinch;
pub mod socket;
pub mod stargate;
pub mod zerox;

pub use lifi::LiFi;
pub use oneinch::OneInch;
pub use socket::Socket;
pub use stargate::Stargate;
pub use zerox::ZeroEx;

use crate::chains;
use crate::config::AppConfig;
use crate::errors::{ErrorCode, ExecError};
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use crate::router::routes::RouteStep;
use crate::transport::ChainRpc;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub const ONE_INCH: &str = "1inch";
pub const ZERO_X: &str = "0x";
pub const LIFI: &str = "lifi";
pub const SOCKET: &str = "socket";
pub const STARGATE: &str = "stargate";

/// Chain-executable payload, whichever venue produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calldata {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
    pub provider: String,
}

#[async_trait]
pub trait SwapProvider: Send + Sync {
    fn name(&self) -> &'static str;
    /// `slippage_pct` is a percentage, 0.5 meaning 0.5%.
    async fn swap_calldata(
        &self,
        step: &RouteStep,
        from: Address,
        slippage_pct: f64,
    ) -> Result<Calldata, ExecError>;
}

#[async_trait]
pub trait BridgeProtocol: Send + Sync {
    fn name(&self) -> &'static str;
    async fn bridge_calldata(&self, step: &RouteStep, from: Address) -> Result<Calldata, ExecError>;
}

/// Map the names routes and configs use onto the canonical venue names.
pub fn canonical_provider(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "1inch" | "oneinch" | "1inch-v6" => Some(ONE_INCH),
        "0x" | "zerox" | "0x-v2" | "matcha" => Some(ZERO_X),
        "lifi" | "li.fi" | "jumper" => Some(LIFI),
        "socket" | "bungee" => Some(SOCKET),
        "stargate" | "layerzero" => Some(STARGATE),
        _ => None,
    }
}

pub struct CalldataProvider {
    swaps: Vec<Arc<dyn SwapProvider>>,
    bridges: Vec<Arc<dyn BridgeProtocol>>,
}

impl CalldataProvider {
    /// `swaps` in priority order; `bridges` in fallback order.
    pub fn new(swaps: Vec<Arc<dyn SwapProvider>>, bridges: Vec<Arc<dyn BridgeProtocol>>) -> Self {
        Self { swaps, bridges }
    }

    pub fn from_config(
        cfg: &AppConfig,
        rpcs: &HashMap<String, Arc<dyn ChainRpc>>,
    ) -> Result<Self, ExecError> {
        let keys = &cfg.providers;
        let oneinch = Arc::new(OneInch::new(keys.oneinch_api_key.clone())?);
        let zerox = Arc::new(ZeroEx::new(keys.zerox_api_key.clone())?);
        let lifi = Arc::new(LiFi::new(keys.lifi_api_key.clone())?);
        let socket = Arc::new(Socket::new(keys.socket_api_key.clone())?);
        let stargate = Arc::new(Stargate::new(rpcs.clone()));

        let mut swaps: Vec<Arc<dyn SwapProvider>> = Vec::new();
        for name in keys.swap_priority() {
            match canonical_provider(&name) {
                Some(ONE_INCH) => swaps.push(oneinch.clone()),
                Some(ZERO_X) => swaps.push(zerox.clone()),
                Some(LIFI) => swaps.push(lifi.clone()),
                _ => warn!(provider = %name, "not a swap provider, ignoring in priority list"),
            }
        }
        let bridges: Vec<Arc<dyn BridgeProtocol>> = vec![stargate, lifi, socket];
        Ok(Self::new(swaps, bridges))
    }

    pub fn swap_providers(&self) -> Vec<&'static str> {
        self.swaps.iter().map(|p| p.name()).collect()
    }

    fn swap_order(&self, preferred: Option<&str>) -> Vec<Arc<dyn SwapProvider>> {
        let mut order = self.swaps.clone();
        if let Some(name) = preferred.and_then(canonical_provider) {
            if let Some(idx) = order.iter().position(|p| p.name() == name) {
                let first = order.remove(idx);
                order.insert(0, first);
            }
        }
        order
    }

    /// First provider to answer wins; with every provider failing, the last
    /// provider's error is returned.
    pub async fn get_swap_calldata(
        &self,
        step: &RouteStep,
        from: Address,
        slippage_pct: f64,
    ) -> Result<Calldata, ExecError> {
        let mut last_err = None;
        for provider in self.swap_order(step.provider.as_deref()) {
            match provider.swap_calldata(step, from, slippage_pct).await {
                Ok(calldata) => {
                    debug!(provider = provider.name(), chain = %step.from_chain, "swap calldata ready");
                    return Ok(calldata);
                }
                Err(err) => {
                    warn!(
                        provider = provider.name(),
                        chain = %step.from_chain,
                        error = %err,
                        "swap provider failed, trying next"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ExecError::provider("calldata", "no swap providers configured")))
    }

    /// Step's own protocol when supported, Stargate for stablecoins,
    /// otherwise the general-purpose aggregator.
    pub fn select_bridge_protocol(&self, step: &RouteStep) -> &'static str {
        if let Some(name) = step.provider.as_deref().and_then(canonical_provider) {
            if self.bridges.iter().any(|b| b.name() == name) {
                return name;
            }
        }
        if chains::is_stablecoin(&step.from_token) && self.bridges.iter().any(|b| b.name() == STARGATE) {
            return STARGATE;
        }
        LIFI
    }

    pub async fn get_bridge_calldata(&self, step: &RouteStep, from: Address) -> Result<Calldata, ExecError> {
        let selected = self.select_bridge_protocol(step);
        let mut order: Vec<&Arc<dyn BridgeProtocol>> = Vec::with_capacity(self.bridges.len());
        order.extend(self.bridges.iter().filter(|b| b.name() == selected));
        order.extend(self.bridges.iter().filter(|b| b.name() != selected));

        let mut last_err = None;
        for protocol in order {
            match protocol.bridge_calldata(step, from).await {
                Ok(calldata) => {
                    debug!(
                        protocol = protocol.name(),
                        from_chain = %step.from_chain,
                        to_chain = %step.to_chain,
                        "bridge calldata ready"
                    );
                    return Ok(calldata);
                }
                Err(err) => {
                    warn!(
                        protocol = protocol.name(),
                        from_chain = %step.from_chain,
                        to_chain = %step.to_chain,
                        error = %err,
                        "bridge protocol failed, trying next"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ExecError::provider("calldata", "no bridge protocols configured")))
    }
}

/// Send an aggregator request and decode its JSON body, with latency and
/// error metrics under `service`.
pub(crate) async fn send_json(
    service: &str,
    method: &str,
    req: reqwest::RequestBuilder,
) -> Result<Value, ExecError> {
    let _timer = REQ_LATENCY.with_label_values(&[service, method]).start_timer();
    let result = async {
        let resp = req.send().await.map_err(|e| ExecError::from_http(service, e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ExecError::from_http(service, e))?;
        if status.as_u16() == 429 {
            return Err(ExecError::coded(
                ErrorCode::RateLimited,
                format!("{service} {method}: http 429"),
            ));
        }
        if !status.is_success() {
            let excerpt: String = body.chars().take(200).collect();
            return Err(ExecError::provider(
                service,
                format!("{method}: http {status}: {excerpt}"),
            ));
        }
        serde_json::from_str::<Value>(&body)
            .map_err(|e| ExecError::provider(service, format!("{method}: decode body: {e}")))
    }
    .await;
    if result.is_err() {
        REQ_ERRORS.with_label_values(&[service, method]).inc();
    }
    result
}

pub(crate) fn field<'a>(provider: &str, v: &'a Value, key: &str) -> Result<&'a Value, ExecError> {
    match v.get(key) {
        Some(found) if !found.is_null() => Ok(found),
        _ => Err(ExecError::provider(provider, format!("response missing `{key}`"))),
    }
}

pub(crate) fn parse_address(provider: &str, v: &Value) -> Result<Address, ExecError> {
    let s = v
        .as_str()
        .ok_or_else(|| ExecError::provider(provider, format!("address is not a string: {v}")))?;
    Address::from_str(s).map_err(|e| ExecError::provider(provider, format!("bad address {s}: {e}")))
}

pub(crate) fn parse_bytes(provider: &str, v: &Value) -> Result<Bytes, ExecError> {
    let s = v
        .as_str()
        .ok_or_else(|| ExecError::provider(provider, format!("calldata is not a string: {v}")))?;
    let raw = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ExecError::provider(provider, format!("bad calldata hex: {e}")))?;
    Ok(Bytes::from(raw))
}

/// Wei amounts arrive as hex strings, decimal strings or JSON numbers.
/// Missing or null means zero.
pub(crate) fn parse_amount(provider: &str, v: Option<&Value>) -> Result<U256, ExecError> {
    let bad = |s: &dyn std::fmt::Display| ExecError::provider(provider, format!("bad amount {s}"));
    match v {
        None | Some(Value::Null) => Ok(U256::ZERO),
        Some(Value::Number(n)) => n.as_u64().map(U256::from).ok_or_else(|| bad(n)),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(U256::ZERO)
            } else if let Some(digits) = s.strip_prefix("0x") {
                if digits.is_empty() {
                    return Ok(U256::ZERO);
                }
                U256::from_str_radix(digits, 16).map_err(|_| bad(&s))
            } else {
                U256::from_str_radix(s, 10).map_err(|_| bad(&s))
            }
        }
        Some(other) => Err(bad(other)),
    }
}

/// Gas limits are advisory; anything unparseable is dropped.
pub(crate) fn parse_gas(v: Option<&Value>) -> Option<u64> {
    let parsed = parse_amount("gas", v).ok()?;
    if parsed.is_zero() {
        return None;
    }
    u64::try_from(parsed).ok()
}

pub(crate) fn chain_id(chain: &str) -> Result<u64, ExecError> {
    chains::chain_info(chain)
        .map(|c| c.chain_id)
        .ok_or_else(|| ExecError::invalid_route(format!("unsupported chain {chain}")))
}

pub(crate) fn token(chain: &str, token: &str) -> Result<Address, ExecError> {
    chains::token_address(chain, token)
        .ok_or_else(|| ExecError::invalid_route(format!("unknown token {token} on {chain}")))
}

/// Bridged funds go to the step recipient, or back to the sender.
pub(crate) fn receiver(step: &RouteStep, from: Address) -> Result<Address, ExecError> {
    match step.recipient.as_deref() {
        Some(r) => Address::from_str(r)
            .map_err(|e| ExecError::invalid_route(format!("bad recipient {r}: {e}"))),
        None => Ok(from),
    }
}
