// 1inch swap adapter
// Builds same-chain swap transactions through the 1inch v6 swap API
//
// Numan Thabit 2025 Nov

use crate::errors::ExecError;
use crate::router::routes::RouteStep;
use crate::transport::http_client;
use crate::venues::{
    chain_id, field, parse_address, parse_amount, parse_bytes, parse_gas, send_json, token, Calldata,
    SwapProvider, ONE_INCH,
};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const BASE_URL: &str = "https://api.1inch.dev/swap/v6.0";

pub struct OneInch {
    http: Client,
    api_key: Option<String>,
}

impl OneInch {
    pub fn new(api_key: Option<String>) -> Result<Self, ExecError> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }
}

/// `{ "tx": { "to", "data", "value", "gas" } }`
pub(crate) fn normalize(body: &Value) -> Result<Calldata, ExecError> {
    let tx = field(ONE_INCH, body, "tx")?;
    Ok(Calldata {
        to: parse_address(ONE_INCH, field(ONE_INCH, tx, "to")?)?,
        data: parse_bytes(ONE_INCH, field(ONE_INCH, tx, "data")?)?,
        value: parse_amount(ONE_INCH, tx.get("value"))?,
        gas_limit: parse_gas(tx.get("gas")),
        provider: ONE_INCH.to_string(),
    })
}

#[async_trait]
impl SwapProvider for OneInch {
    fn name(&self) -> &'static str {
        ONE_INCH
    }

    async fn swap_calldata(
        &self,
        step: &RouteStep,
        from: Address,
        slippage_pct: f64,
    ) -> Result<Calldata, ExecError> {
        let chain = chain_id(&step.from_chain)?;
        let src = token(&step.from_chain, &step.from_token)?;
        let dst = token(&step.from_chain, &step.to_token)?;
        let amount = step.amount_units()?;

        let mut req = self
            .http
            .get(format!("{BASE_URL}/{chain}/swap"))
            .query(&[
                ("src", src.to_string()),
                ("dst", dst.to_string()),
                ("amount", amount.to_string()),
                ("from", from.to_string()),
                ("origin", from.to_string()),
                ("slippage", slippage_pct.to_string()),
                ("disableEstimate", "true".to_string()),
            ]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let body = send_json(ONE_INCH, "swap", req).await?;
        normalize(&body)
    }
}
