// 0x swap adapter
// Builds same-chain swap transactions through the 0x v2 allowance-holder quote
//
// Numan Thabit 2025 Nov

use crate::errors::ExecError;
use crate::router::routes::RouteStep;
use crate::transport::http_client;
use crate::venues::{
    chain_id, field, parse_address, parse_amount, parse_bytes, parse_gas, send_json, token, Calldata,
    SwapProvider, ZERO_X,
};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const QUOTE_URL: &str = "https://api.0x.org/swap/allowance-holder/quote";

pub struct ZeroEx {
    http: Client,
    api_key: Option<String>,
}

impl ZeroEx {
    pub fn new(api_key: Option<String>) -> Result<Self, ExecError> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }
}

pub(crate) fn normalize(body: &Value) -> Result<Calldata, ExecError> {
    if body.get("liquidityAvailable").and_then(Value::as_bool) == Some(false) {
        return Err(ExecError::provider(ZERO_X, "no liquidity available for pair"));
    }
    let tx = field(ZERO_X, body, "transaction")?;
    Ok(Calldata {
        to: parse_address(ZERO_X, field(ZERO_X, tx, "to")?)?,
        data: parse_bytes(ZERO_X, field(ZERO_X, tx, "data")?)?,
        value: parse_amount(ZERO_X, tx.get("value"))?,
        gas_limit: parse_gas(tx.get("gas")),
        provider: ZERO_X.to_string(),
    })
}

/// Percent to basis points, clamped to what the API accepts.
fn slippage_bps(slippage_pct: f64) -> u32 {
    (slippage_pct * 100.0).round().clamp(0.0, 10_000.0) as u32
}

#[async_trait]
impl SwapProvider for ZeroEx {
    fn name(&self) -> &'static str {
        ZERO_X
    }

    async fn swap_calldata(
        &self,
        step: &RouteStep,
        from: Address,
        slippage_pct: f64,
    ) -> Result<Calldata, ExecError> {
        let chain = chain_id(&step.from_chain)?;
        let sell = token(&step.from_chain, &step.from_token)?;
        let buy = token(&step.from_chain, &step.to_token)?;
        let amount = step.amount_units()?;

        let mut req = self
            .http
            .get(QUOTE_URL)
            .header("0x-version", "v2")
            .query(&[
                ("chainId", chain.to_string()),
                ("sellToken", sell.to_string()),
                ("buyToken", buy.to_string()),
                ("sellAmount", amount.to_string()),
                ("taker", from.to_string()),
                ("slippageBps", slippage_bps(slippage_pct).to_string()),
            ]);
        if let Some(key) = &self.api_key {
            req = req.header("0x-api-key", key);
        }
        let body = send_json(ZERO_X, "quote", req).await?;
        normalize(&body)
    }
}
