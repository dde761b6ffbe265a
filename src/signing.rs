// Transaction signing module
// This file holds the per-chain gas wallet keys and signs EIP-1559
// transactions into EIP-2718 encoded raw bytes ready for broadcast
//
// Numan Thabit 2025 Nov

use crate::errors::ExecError;
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct SignedTx {
    pub hash: B256,
    pub raw: Bytes,
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self, chain: &str) -> Result<Address, ExecError>;
    async fn sign_transaction(&self, chain: &str, tx: TxEip1559) -> Result<SignedTx, ExecError>;
}

/// Local secp256k1 keys, one per chain. Chains may share a key.
#[derive(Default)]
pub struct Keyring {
    signers: HashMap<String, PrivateKeySigner>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_hex(&mut self, chain: &str, key_hex: &str) -> Result<Address, ExecError> {
        let signer = PrivateKeySigner::from_str(key_hex.trim())
            .map_err(|e| ExecError::Signing(format!("invalid key for {chain}: {e}")))?;
        let address = signer.address();
        self.signers.insert(chain.to_string(), signer);
        Ok(address)
    }

    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.signers.keys().map(String::as_str)
    }

    fn signer(&self, chain: &str) -> Result<&PrivateKeySigner, ExecError> {
        self.signers
            .get(chain)
            .ok_or_else(|| ExecError::Signing(format!("no gas wallet key for chain {chain}")))
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let addrs: HashMap<&str, Address> = self
            .signers
            .iter()
            .map(|(c, s)| (c.as_str(), s.address()))
            .collect();
        f.debug_struct("Keyring").field("addresses", &addrs).finish()
    }
}

#[async_trait]
impl TxSigner for Keyring {
    fn address(&self, chain: &str) -> Result<Address, ExecError> {
        Ok(self.signer(chain)?.address())
    }

    async fn sign_transaction(&self, chain: &str, tx: TxEip1559) -> Result<SignedTx, ExecError> {
        let signer = self.signer(chain)?;
        let signature = signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| ExecError::Signing(e.to_string()))?;
        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let envelope = TxEnvelope::Eip1559(signed);
        Ok(SignedTx {
            hash,
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, U256};

    const ANVIL_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_address() {
        let mut keys = Keyring::new();
        let addr = keys.insert_hex("base", ANVIL_KEY).unwrap();
        assert_eq!(
            addr,
            Address::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
        assert!(keys.address("ethereum").is_err());
        assert!(keys.insert_hex("bsc", "0x1234").is_err());
    }

    #[tokio::test]
    async fn signs_typed_transaction() {
        let mut keys = Keyring::new();
        keys.insert_hex("base", ANVIL_KEY).unwrap();
        let tx = TxEip1559 {
            chain_id: 8453,
            nonce: 7,
            gas_limit: 21_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000,
            to: Address::repeat_byte(0x42).into(),
            value: U256::from(1u64),
            ..Default::default()
        };
        let signed = keys.sign_transaction("base", tx).await.unwrap();
        // EIP-2718 type byte for 1559
        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.hash, keccak256(&signed.raw));
        assert!(!format!("{keys:?}").contains("ac0974"));
    }
}
