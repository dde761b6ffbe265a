// Transport layer module
// This file defines the chain RPC contract used by the gas layer and the
// transaction dispatcher, plus the shared HTTP client factory
//
// Numan Thabit 2025 Nov

pub mod jsonrpc;

pub use jsonrpc::EvmJsonRpc;

use crate::errors::{ErrorCode, ExecError};
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use std::time::Duration;

/// Bounded timeout for every outbound HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub fn http_client() -> Result<reqwest::Client, ExecError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| ExecError::Transport(format!("build HTTP client: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub block_number: u64,
    pub success: bool,
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ExecError>;
    async fn get_balance(&self, address: Address) -> Result<U256, ExecError>;
    async fn gas_price(&self) -> Result<u128, ExecError>;
    async fn max_priority_fee(&self) -> Result<u128, ExecError>;
    /// Next nonce including pending transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64, ExecError>;
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ExecError>;
    async fn block_number(&self) -> Result<u64, ExecError>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ExecError>;
    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
        value: U256,
    ) -> Result<u64, ExecError>;

    /// Poll until the receipt is `confirmations` blocks deep or reverted.
    /// Gives up after `max_wait` with a retryable TIMEOUT.
    async fn wait_for_confirmations(
        &self,
        hash: B256,
        confirmations: u64,
        max_wait: Duration,
    ) -> Result<TxReceipt, ExecError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Some(max_wait),
            ..ExponentialBackoff::default()
        };
        let poll = retry(policy, || async move {
            let receipt = self
                .transaction_receipt(hash)
                .await
                .map_err(backoff::Error::transient)?
                .ok_or_else(|| {
                    backoff::Error::transient(ExecError::coded(
                        ErrorCode::Timeout,
                        format!("transaction {hash} still pending"),
                    ))
                })?;
            if !receipt.success {
                return Ok(receipt);
            }
            let head = self
                .block_number()
                .await
                .map_err(backoff::Error::transient)?;
            let depth = head.saturating_sub(receipt.block_number) + 1;
            if depth >= confirmations {
                Ok(receipt)
            } else {
                Err(backoff::Error::transient(ExecError::coded(
                    ErrorCode::Timeout,
                    format!("transaction {hash} has {depth}/{confirmations} confirmations"),
                )))
            }
        });
        match tokio::time::timeout(max_wait, poll).await {
            Ok(res) => res,
            Err(_) => Err(ExecError::coded(
                ErrorCode::Timeout,
                format!(
                    "transaction {hash} not confirmed within {}s",
                    max_wait.as_secs()
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockRpc;

    #[tokio::test(start_paused = true)]
    async fn waits_for_depth() {
        let rpc = MockRpc::new().with_receipt_after_polls(2);
        let hash = B256::repeat_byte(0x11);
        let receipt = rpc
            .wait_for_confirmations(hash, 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(receipt.success);
        assert!(rpc.receipt_polls() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn never_mined_is_retryable_timeout() {
        let rpc = MockRpc::new().with_receipt_after_polls(u32::MAX);
        let err = rpc
            .wait_for_confirmations(B256::ZERO, 1, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Timeout));
        assert!(crate::errors::is_retryable(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn revert_returns_without_waiting_for_depth() {
        let rpc = MockRpc::new().with_revert();
        let receipt = rpc
            .wait_for_confirmations(B256::ZERO, 50, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!receipt.success);
    }
}
