// LI.FI adapter
// Quotes swaps and cross-chain transfers through the LI.FI quote API; the
// same endpoint serves both, keyed by source and destination chain
//
// Numan Thabit 2025 Nov

use crate::errors::ExecError;
use crate::router::routes::RouteStep;
use crate::transport::http_client;
use crate::venues::{
    chain_id, field, parse_address, parse_amount, parse_bytes, parse_gas, receiver, send_json, token,
    BridgeProtocol, Calldata, SwapProvider, LIFI,
};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const QUOTE_URL: &str = "https://li.quest/v1/quote";
/// Bridge steps carry no slippage of their own.
const BRIDGE_SLIPPAGE: f64 = 0.005;

pub struct LiFi {
    http: Client,
    api_key: Option<String>,
}

impl LiFi {
    pub fn new(api_key: Option<String>) -> Result<Self, ExecError> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }

    async fn quote(
        &self,
        step: &RouteStep,
        from: Address,
        to_address: Address,
        slippage: f64,
    ) -> Result<Calldata, ExecError> {
        let from_chain = chain_id(&step.from_chain)?;
        let to_chain = chain_id(&step.to_chain)?;
        let from_token = token(&step.from_chain, &step.from_token)?;
        let to_token = token(&step.to_chain, &step.to_token)?;
        let amount = step.amount_units()?;

        let mut req = self.http.get(QUOTE_URL).query(&[
            ("fromChain", from_chain.to_string()),
            ("toChain", to_chain.to_string()),
            ("fromToken", from_token.to_string()),
            ("toToken", to_token.to_string()),
            ("fromAmount", amount.to_string()),
            ("fromAddress", from.to_string()),
            ("toAddress", to_address.to_string()),
            ("slippage", slippage.to_string()),
        ]);
        if let Some(key) = &self.api_key {
            req = req.header("x-lifi-api-key", key);
        }
        let body = send_json(LIFI, "quote", req).await?;
        normalize(&body)
    }
}

/// `{ "transactionRequest": { "to", "data", "value", "gasLimit" } }`, amounts in hex.
pub(crate) fn normalize(body: &Value) -> Result<Calldata, ExecError> {
    let tx = field(LIFI, body, "transactionRequest")?;
    Ok(Calldata {
        to: parse_address(LIFI, field(LIFI, tx, "to")?)?,
        data: parse_bytes(LIFI, field(LIFI, tx, "data")?)?,
        value: parse_amount(LIFI, tx.get("value"))?,
        gas_limit: parse_gas(tx.get("gasLimit")),
        provider: LIFI.to_string(),
    })
}

#[async_trait]
impl SwapProvider for LiFi {
    fn name(&self) -> &'static str {
        LIFI
    }

    async fn swap_calldata(
        &self,
        step: &RouteStep,
        from: Address,
        slippage_pct: f64,
    ) -> Result<Calldata, ExecError> {
        // fraction, not percent
        self.quote(step, from, from, slippage_pct / 100.0).await
    }
}

#[async_trait]
impl BridgeProtocol for LiFi {
    fn name(&self) -> &'static str {
        LIFI
    }

    async fn bridge_calldata(&self, step: &RouteStep, from: Address) -> Result<Calldata, ExecError> {
        let to_address = receiver(step, from)?;
        self.quote(step, from, to_address, BRIDGE_SLIPPAGE).await
    }
}
