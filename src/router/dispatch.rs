// Transaction dispatch
// This file turns a transaction request into a signed EIP-1559 transaction,
// serializes nonce use per chain wallet, broadcasts it and waits for depth
//
// Numan Thabit 2025 Nov

use crate::chains;
use crate::config::AppConfig;
use crate::errors::{ErrorCode, ExecError};
use crate::gas::GasAbstraction;
use crate::signing::TxSigner;
use crate::transport::TxReceipt;
use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes, B256, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(180);

/// Gas limit headroom over the estimate, in percent.
const GAS_LIMIT_BUFFER_PCT: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub chain: String,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Venue-provided limit; estimated over RPC when absent.
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSettings {
    pub confirmations: u64,
    pub confirmation_timeout: Duration,
}

impl ChainSettings {
    pub fn defaults_for(chain: &str) -> Self {
        Self {
            confirmations: chains::chain_info(chain)
                .map(|c| c.default_confirmations)
                .unwrap_or(1)
                .max(1),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

type NonceSlot = Arc<Mutex<Option<u64>>>;

pub struct Dispatcher {
    gas: Arc<GasAbstraction>,
    signer: Arc<dyn TxSigner>,
    settings: HashMap<String, ChainSettings>,
    /// Next nonce per chain wallet; None forces a resync from the node.
    nonces: Mutex<HashMap<String, NonceSlot>>,
}

impl Dispatcher {
    pub fn new(gas: Arc<GasAbstraction>, signer: Arc<dyn TxSigner>) -> Self {
        Self {
            gas,
            signer,
            settings: HashMap::new(),
            nonces: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_chain_settings(mut self, chain: &str, settings: ChainSettings) -> Self {
        self.settings.insert(chain.to_string(), settings);
        self
    }

    pub fn with_config(mut self, cfg: &AppConfig) -> Self {
        for chain in cfg.chains.keys() {
            self.settings.insert(
                chain.clone(),
                ChainSettings {
                    confirmations: cfg.confirmations(chain),
                    confirmation_timeout: cfg.confirmation_timeout(chain),
                },
            );
        }
        self
    }

    pub fn chain_settings(&self, chain: &str) -> ChainSettings {
        self.settings
            .get(chain)
            .copied()
            .unwrap_or_else(|| ChainSettings::defaults_for(chain))
    }

    pub fn address(&self, chain: &str) -> Result<Address, ExecError> {
        self.signer.address(chain)
    }

    async fn nonce_slot(&self, chain: &str) -> NonceSlot {
        self.nonces
            .lock()
            .await
            .entry(chain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Sign and broadcast `req`. The chain's nonce slot stays locked from
    /// nonce selection through broadcast; a failed broadcast drops the cached
    /// nonce so the next send resyncs.
    pub async fn send(&self, req: &TxRequest) -> Result<B256, ExecError> {
        let chain = req.chain.as_str();
        let info = chains::chain_info(chain)
            .ok_or_else(|| ExecError::invalid_route(format!("unsupported chain {chain}")))?;
        let rpc = self.gas.rpc(chain)?;
        let from = self.signer.address(chain)?;
        let fees = self.gas.fee_data(chain).await?;

        let base_limit = match req.gas_limit {
            Some(limit) => limit,
            None => rpc
                .estimate_gas(from, req.to, &req.data, req.value)
                .await
                .map_err(|e| match e.code() {
                    Some(code) if code != ErrorCode::RpcError => e,
                    _ => ExecError::coded(ErrorCode::GasEstimationFailed, e.to_string()),
                })?,
        };
        let gas_limit = base_limit.saturating_mul(GAS_LIMIT_BUFFER_PCT) / 100;

        let slot = self.nonce_slot(chain).await;
        let mut next = slot.lock().await;
        let nonce = match *next {
            Some(n) => n,
            None => {
                let n = rpc.transaction_count(from).await?;
                debug!(chain = %chain, nonce = n, "nonce synced from node");
                n
            }
        };

        let tx = TxEip1559 {
            chain_id: info.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas(),
            max_priority_fee_per_gas: fees.max_priority_fee,
            to: req.to.into(),
            value: req.value,
            input: req.data.clone(),
            ..Default::default()
        };
        let signed = self.signer.sign_transaction(chain, tx).await?;

        match rpc.send_raw_transaction(&signed.raw).await {
            Ok(hash) => {
                *next = Some(nonce + 1);
                debug!(chain = %chain, nonce = nonce, tx_hash = %hash, "transaction broadcast");
                Ok(hash)
            }
            Err(err) => {
                *next = None;
                warn!(chain = %chain, nonce = nonce, error = %err, "broadcast failed, nonce will resync");
                Err(err)
            }
        }
    }

    /// Wait for the chain's confirmation depth. A reverted receipt is a
    /// CONTRACT_ERROR; expiry of the bounded wait is a retryable TIMEOUT.
    pub async fn confirm(&self, chain: &str, hash: B256) -> Result<TxReceipt, ExecError> {
        let rpc = self.gas.rpc(chain)?;
        let settings = self.chain_settings(chain);
        let receipt = rpc
            .wait_for_confirmations(hash, settings.confirmations, settings.confirmation_timeout)
            .await?;
        // spent gas either way
        self.gas.invalidate_balance(chain).await;
        if !receipt.success {
            return Err(ExecError::coded(
                ErrorCode::ContractError,
                format!("transaction {hash} reverted in block {}", receipt.block_number),
            ));
        }
        Ok(receipt)
    }
}
