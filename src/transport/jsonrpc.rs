// JSON-RPC transport layer implementation
// This file implements the Ethereum JSON-RPC 2.0 client used to submit raw
// transactions, read balances and fees, and poll receipts over HTTP
//
// Numan Thabit 2025 Nov

use crate::errors::{ErrorCode, ExecError};
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use crate::transport::{http_client, ChainRpc, TxReceipt};
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

#[derive(Debug)]
pub struct EvmJsonRpc {
    http: Client,
    url: Url,
    chain: String,
    next_id: AtomicU64,
}

impl EvmJsonRpc {
    pub fn new(chain: impl Into<String>, url: Url) -> Result<Self, ExecError> {
        Ok(Self {
            http: http_client()?,
            url,
            chain: chain.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.url.as_str()
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ExecError> {
        let service = format!("rpc:{}", self.chain);
        let _timer = REQ_LATENCY
            .with_label_values(&[service.as_str(), method])
            .start_timer();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let result = self.send(&service, method, &payload).await;
        if result.is_err() {
            REQ_ERRORS
                .with_label_values(&[service.as_str(), method])
                .inc();
        }
        let value = result?;
        serde_json::from_value(value)
            .map_err(|e| ExecError::Rpc(format!("{method}: decode result: {e}")))
    }

    async fn send(&self, service: &str, method: &str, payload: &Value) -> Result<Value, ExecError> {
        let resp = self
            .http
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| ExecError::from_http(service, e))?;
        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ExecError::coded(
                ErrorCode::RateLimited,
                format!("{service} {method}: http 429"),
            ));
        }
        if !status.is_success() {
            return Err(ExecError::coded(
                ErrorCode::RpcError,
                format!("{service} {method}: http {status}"),
            ));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ExecError::Rpc(format!("{method}: json parse: {e}")))?;
        take_result(body).map_err(|msg| ExecError::Rpc(format!("{method}: {msg}")))
    }
}

/// Split a JSON-RPC envelope into its result or its error message.
fn take_result(mut body: Value) -> Result<Value, String> {
    if let Some(err) = body.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(message);
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err("response has neither result nor error".to_string()),
    }
}

pub(crate) fn parse_u64(hex_qty: &str) -> Result<u64, ExecError> {
    let digits = hex_qty.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ExecError::Rpc(format!("bad quantity {hex_qty}: {e}")))
}

pub(crate) fn parse_u128(hex_qty: &str) -> Result<u128, ExecError> {
    let digits = hex_qty.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ExecError::Rpc(format!("bad quantity {hex_qty}: {e}")))
}

pub(crate) fn parse_u256(hex_qty: &str) -> Result<U256, ExecError> {
    let digits = hex_qty.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ExecError::Rpc(format!("bad quantity {hex_qty}: {e}")))
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

fn parse_receipt(raw: Option<RawReceipt>) -> Result<Option<TxReceipt>, ExecError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    // mined receipts always carry a block number
    let Some(block) = raw.block_number else {
        return Ok(None);
    };
    Ok(Some(TxReceipt {
        block_number: parse_u64(&block)?,
        success: raw.status.as_deref().map(parse_u64).transpose()? != Some(0),
    }))
}

#[async_trait]
impl ChainRpc for EvmJsonRpc {
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ExecError> {
        let hash: String = self
            .request("eth_sendRawTransaction", json!([to_hex(raw)]))
            .await?;
        B256::from_str(&hash).map_err(|e| ExecError::Rpc(format!("bad tx hash {hash}: {e}")))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ExecError> {
        let qty: String = self
            .request("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        parse_u256(&qty)
    }

    async fn gas_price(&self) -> Result<u128, ExecError> {
        let qty: String = self.request("eth_gasPrice", json!([])).await?;
        parse_u128(&qty)
    }

    async fn max_priority_fee(&self) -> Result<u128, ExecError> {
        let qty: String = self.request("eth_maxPriorityFeePerGas", json!([])).await?;
        parse_u128(&qty)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ExecError> {
        let qty: String = self
            .request("eth_getTransactionCount", json!([address.to_string(), "pending"]))
            .await?;
        parse_u64(&qty)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ExecError> {
        let raw: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        parse_receipt(raw)
    }

    async fn block_number(&self) -> Result<u64, ExecError> {
        let qty: String = self.request("eth_blockNumber", json!([])).await?;
        parse_u64(&qty)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ExecError> {
        let out: String = self
            .request(
                "eth_call",
                json!([{ "to": to.to_string(), "data": to_hex(&data) }, "latest"]),
            )
            .await?;
        let decoded = hex::decode(out.trim_start_matches("0x"))
            .map_err(|e| ExecError::Rpc(format!("eth_call output: {e}")))?;
        Ok(Bytes::from(decoded))
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
        value: U256,
    ) -> Result<u64, ExecError> {
        let qty: String = self
            .request(
                "eth_estimateGas",
                json!([{
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "data": to_hex(data),
                    "value": format!("0x{value:x}"),
                }]),
            )
            .await?;
        parse_u64(&qty)
    }
}
