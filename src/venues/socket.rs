// Socket bridge adapter
// Picks the best Socket (Bungee) route for a cross-chain transfer and turns
// it into a transaction with the build-tx endpoint
//
// Numan Thabit 2025 Nov

use crate::errors::ExecError;
use crate::router::routes::RouteStep;
use crate::transport::http_client;
use crate::venues::{
    chain_id, field, parse_address, parse_amount, parse_bytes, receiver, send_json, token,
    BridgeProtocol, Calldata, SOCKET,
};
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "https://api.socket.tech/v2";

pub struct Socket {
    http: Client,
    api_key: Option<String>,
}

impl Socket {
    pub fn new(api_key: Option<String>) -> Result<Self, ExecError> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }

    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("API-KEY", key),
            None => req,
        }
    }
}

/// Socket wraps payloads as `{ "success": bool, "result": ... }`.
fn unwrap_result(body: &Value) -> Result<&Value, ExecError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let msg = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("request unsuccessful");
        return Err(ExecError::provider(SOCKET, msg.to_string()));
    }
    field(SOCKET, body, "result")
}

/// Routes come back sorted by output; the first one is taken.
pub(crate) fn best_route(body: &Value) -> Result<Value, ExecError> {
    unwrap_result(body)?
        .get("routes")
        .and_then(Value::as_array)
        .and_then(|routes| routes.first())
        .cloned()
        .ok_or_else(|| ExecError::provider(SOCKET, "no route found for transfer"))
}

/// `{ "result": { "txTarget", "txData", "value" } }`
pub(crate) fn normalize_build_tx(body: &Value) -> Result<Calldata, ExecError> {
    let tx = unwrap_result(body)?;
    Ok(Calldata {
        to: parse_address(SOCKET, field(SOCKET, tx, "txTarget")?)?,
        data: parse_bytes(SOCKET, field(SOCKET, tx, "txData")?)?,
        value: parse_amount(SOCKET, tx.get("value"))?,
        gas_limit: None,
        provider: SOCKET.to_string(),
    })
}

#[async_trait]
impl BridgeProtocol for Socket {
    fn name(&self) -> &'static str {
        SOCKET
    }

    async fn bridge_calldata(&self, step: &RouteStep, from: Address) -> Result<Calldata, ExecError> {
        let from_chain = chain_id(&step.from_chain)?;
        let to_chain = chain_id(&step.to_chain)?;
        let from_token = token(&step.from_chain, &step.from_token)?;
        let to_token = token(&step.to_chain, &step.to_token)?;
        let amount = step.amount_units()?;
        let recipient = receiver(step, from)?;

        let quote_req = self.with_key(self.http.get(format!("{BASE_URL}/quote")).query(&[
            ("fromChainId", from_chain.to_string()),
            ("toChainId", to_chain.to_string()),
            ("fromTokenAddress", from_token.to_string()),
            ("toTokenAddress", to_token.to_string()),
            ("fromAmount", amount.to_string()),
            ("userAddress", from.to_string()),
            ("recipient", recipient.to_string()),
            ("uniqueRoutesPerBridge", "true".to_string()),
            ("sort", "output".to_string()),
        ]));
        let quote = send_json(SOCKET, "quote", quote_req).await?;
        let route = best_route(&quote)?;

        let build_req = self.with_key(
            self.http
                .post(format!("{BASE_URL}/build-tx"))
                .json(&json!({ "route": route })),
        );
        let built = send_json(SOCKET, "build-tx", build_req).await?;
        normalize_build_tx(&built)
    }
}
