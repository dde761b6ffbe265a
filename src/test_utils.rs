// Test doubles
// In-memory chain RPC, venue and bridge mocks shared by the unit tests
//
// Numan Thabit 2025 Nov

use crate::errors::{ErrorCode, ExecError};
use crate::gas::wallet::native_to_wei;
use crate::gas::RebalanceBridge;
use crate::router::routes::RouteStep;
use crate::signing::Keyring;
use crate::transport::{ChainRpc, TxReceipt};
use crate::venues::{BridgeProtocol, Calldata, SwapProvider};
use alloy::primitives::{address, keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ANVIL_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

pub fn eth(amount: f64) -> U256 {
    native_to_wei(amount)
}

/// Keyring holding the anvil key for each chain.
pub fn keyring(chains: &[&str]) -> Keyring {
    let mut keys = Keyring::new();
    for chain in chains {
        keys.insert_hex(chain, ANVIL_KEY).expect("anvil key");
    }
    keys
}

/// Ordered record of broadcasts and confirmations across mocks.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

const RECEIPT_BLOCK: u64 = 100;
const HEAD_BLOCK: u64 = 110;

pub struct MockRpc {
    label: String,
    events: Option<EventLog>,
    balance: Mutex<U256>,
    gas_price: u128,
    failing_reads: bool,
    receipt_after_polls: u64,
    revert: bool,
    call_result: Option<Bytes>,
    estimate_error: Option<ExecError>,
    send_errors: Mutex<VecDeque<ExecError>>,
    sent: Mutex<Vec<Bytes>>,
    balance_reads: AtomicUsize,
    gas_price_reads: AtomicUsize,
    nonce_reads: AtomicUsize,
    receipt_polls: AtomicU64,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            label: "mock".into(),
            events: None,
            balance: Mutex::new(eth(10.0)),
            gas_price: 1_000_000_000,
            failing_reads: false,
            receipt_after_polls: 0,
            revert: false,
            call_result: None,
            estimate_error: None,
            send_errors: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            balance_reads: AtomicUsize::new(0),
            gas_price_reads: AtomicUsize::new(0),
            nonce_reads: AtomicUsize::new(0),
            receipt_polls: AtomicU64::new(0),
        }
    }

    pub fn labeled(mut self, label: &str, events: &EventLog) -> Self {
        self.label = label.to_string();
        self.events = Some(events.clone());
        self
    }

    pub fn with_balance(self, wei: U256) -> Self {
        *self.balance.lock().unwrap() = wei;
        self
    }

    pub fn with_gas_price(mut self, wei: u128) -> Self {
        self.gas_price = wei;
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    /// The first `polls` receipt lookups return nothing.
    pub fn with_receipt_after_polls(mut self, polls: u32) -> Self {
        self.receipt_after_polls = polls as u64;
        self
    }

    pub fn with_revert(mut self) -> Self {
        self.revert = true;
        self
    }

    pub fn with_call_result(mut self, data: Bytes) -> Self {
        self.call_result = Some(data);
        self
    }

    pub fn with_estimate_error(mut self, err: ExecError) -> Self {
        self.estimate_error = Some(err);
        self
    }

    pub fn set_balance(&self, wei: U256) {
        *self.balance.lock().unwrap() = wei;
    }

    pub fn push_send_error(&self, err: ExecError) {
        self.send_errors.lock().unwrap().push_back(err);
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    pub fn gas_price_reads(&self) -> usize {
        self.gas_price_reads.load(Ordering::SeqCst)
    }

    pub fn nonce_reads(&self) -> usize {
        self.nonce_reads.load(Ordering::SeqCst)
    }

    pub fn receipt_polls(&self) -> u64 {
        self.receipt_polls.load(Ordering::SeqCst)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_raw(&self) -> Option<Bytes> {
        self.sent.lock().unwrap().last().cloned()
    }

    fn record(&self, what: &str) {
        if let Some(events) = &self.events {
            events.push(format!("{}:{what}", self.label));
        }
    }

    fn read_guard(&self) -> Result<(), ExecError> {
        if self.failing_reads {
            return Err(ExecError::coded(ErrorCode::NetworkError, "mock rpc unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ExecError> {
        if let Some(err) = self.send_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(Bytes::copy_from_slice(raw));
        self.record("send");
        Ok(keccak256(raw))
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, ExecError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        Ok(*self.balance.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<u128, ExecError> {
        self.gas_price_reads.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        Ok(self.gas_price)
    }

    async fn max_priority_fee(&self) -> Result<u128, ExecError> {
        self.read_guard()?;
        Ok(self.gas_price / 10)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64, ExecError> {
        self.nonce_reads.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        Ok(self.sent_count() as u64)
    }

    async fn transaction_receipt(&self, _hash: B256) -> Result<Option<TxReceipt>, ExecError> {
        let poll = self.receipt_polls.fetch_add(1, Ordering::SeqCst) + 1;
        if poll <= self.receipt_after_polls {
            return Ok(None);
        }
        self.record("confirmed");
        Ok(Some(TxReceipt {
            block_number: RECEIPT_BLOCK,
            success: !self.revert,
        }))
    }

    async fn block_number(&self) -> Result<u64, ExecError> {
        Ok(HEAD_BLOCK)
    }

    async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes, ExecError> {
        self.call_result
            .clone()
            .ok_or_else(|| ExecError::Rpc("execution reverted".into()))
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _to: Address,
        _data: &Bytes,
        _value: U256,
    ) -> Result<u64, ExecError> {
        match &self.estimate_error {
            Some(err) => Err(err.clone()),
            None => Ok(21_000),
        }
    }
}

pub struct MockSwapProvider {
    name: &'static str,
    error: Option<String>,
    calls: AtomicUsize,
}

impl MockSwapProvider {
    pub const ROUTER: Address = address!("1111111254EEB25477B68fb85Ed929f73A960582");

    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str, message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapProvider for MockSwapProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn swap_calldata(
        &self,
        _step: &RouteStep,
        _from: Address,
        _slippage_pct: f64,
    ) -> Result<Calldata, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.error {
            return Err(ExecError::provider(self.name, msg.clone()));
        }
        Ok(Calldata {
            to: Self::ROUTER,
            data: Bytes::from(vec![0x12, 0x34]),
            value: U256::ZERO,
            gas_limit: Some(200_000),
            provider: self.name.to_string(),
        })
    }
}

pub struct MockBridgeProtocol {
    name: &'static str,
    error: Option<String>,
    calls: AtomicUsize,
}

impl MockBridgeProtocol {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str, message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BridgeProtocol for MockBridgeProtocol {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn bridge_calldata(&self, step: &RouteStep, _from: Address) -> Result<Calldata, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.error {
            return Err(ExecError::provider(self.name, msg.clone()));
        }
        Ok(Calldata {
            to: Address::repeat_byte(0xbb),
            data: Bytes::from(vec![0xab]),
            value: step.amount_units().unwrap_or_default(),
            gas_limit: None,
            provider: self.name.to_string(),
        })
    }
}

/// Records every rebalance transfer it is asked to make.
pub struct MockBridge {
    error: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String, U256)>>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            error: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, String, U256)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RebalanceBridge for MockBridge {
    async fn bridge_native(
        &self,
        from_chain: &str,
        to_chain: &str,
        amount_wei: U256,
    ) -> Result<String, ExecError> {
        self.calls
            .lock()
            .unwrap()
            .push((from_chain.to_string(), to_chain.to_string(), amount_wei));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.error {
            return Err(ExecError::provider("bridge", msg.clone()));
        }
        Ok(format!("0x{}", hex::encode(keccak256(from_chain.as_bytes()))))
    }
}
