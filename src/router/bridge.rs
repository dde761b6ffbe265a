// Gas rebalance bridge
// Moves native gas between chain wallets by building a bridge step through the
// calldata layer and sending it with the transaction dispatcher
//
// Numan Thabit 2025 Nov

use crate::chains;
use crate::errors::ExecError;
use crate::gas::RebalanceBridge;
use crate::router::dispatch::{Dispatcher, TxRequest};
use crate::router::routes::{RouteStep, StepType};
use crate::venues::CalldataProvider;
use alloy::primitives::U256;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct GasBridge {
    calldata: Arc<CalldataProvider>,
    dispatcher: Arc<Dispatcher>,
}

impl GasBridge {
    pub fn new(calldata: Arc<CalldataProvider>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            calldata,
            dispatcher,
        }
    }
}

/// Native-to-native bridge step paying into the destination gas wallet.
pub(crate) fn native_bridge_step(
    from_chain: &str,
    to_chain: &str,
    amount_wei: U256,
    recipient: String,
) -> Result<RouteStep, ExecError> {
    let native = |chain: &str| {
        chains::chain_info(chain)
            .map(|c| c.native_symbol.to_string())
            .ok_or_else(|| ExecError::invalid_route(format!("unsupported chain {chain}")))
    };
    Ok(RouteStep {
        step_type: StepType::Bridge,
        from_chain: from_chain.to_string(),
        to_chain: to_chain.to_string(),
        from_token: native(from_chain)?,
        to_token: native(to_chain)?,
        amount: amount_wei.to_string(),
        provider: None,
        gas_estimate: None,
        fee: None,
        recipient: Some(recipient),
    })
}

#[async_trait]
impl RebalanceBridge for GasBridge {
    async fn bridge_native(
        &self,
        from_chain: &str,
        to_chain: &str,
        amount_wei: U256,
    ) -> Result<String, ExecError> {
        if amount_wei.is_zero() {
            return Err(ExecError::invalid_route("rebalance amount rounds to zero"));
        }
        let from = self.dispatcher.address(from_chain)?;
        let to = self.dispatcher.address(to_chain)?;
        let step = native_bridge_step(from_chain, to_chain, amount_wei, to.to_string())?;
        let cd = self.calldata.get_bridge_calldata(&step, from).await?;
        let req = TxRequest {
            chain: from_chain.to_string(),
            to: cd.to,
            data: cd.data,
            value: cd.value,
            gas_limit: cd.gas_limit,
        };
        let hash = self.dispatcher.send(&req).await?;
        info!(
            from = %from_chain,
            to = %to_chain,
            protocol = %cd.provider,
            tx_hash = %hash,
            "rebalance bridge broadcast"
        );
        self.dispatcher.confirm(from_chain, hash).await?;
        Ok(hash.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GasConfig;
    use crate::gas::GasAbstraction;
    use crate::pricing::StaticPriceOracle;
    use crate::storage::MemoryStore;
    use crate::test_utils::{eth, keyring, MockBridgeProtocol, MockRpc, ANVIL_ADDRESS};
    use crate::venues::{LIFI, STARGATE};

    #[test]
    fn step_uses_native_symbols() {
        let step = native_bridge_step("polygon", "arbitrum", U256::from(5u64), "0xabc".into()).unwrap();
        assert_eq!(step.from_token, "POL");
        assert_eq!(step.to_token, "ETH");
        assert_eq!(step.amount, "5");
        assert!(native_bridge_step("solana", "base", U256::from(1u64), "x".into()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn bridges_through_general_aggregator() {
        let rpc = Arc::new(MockRpc::new());
        let gas = GasAbstraction::new(
            Arc::new(StaticPriceOracle::new().with_price("ETH", 2_000.0)),
            Arc::new(MemoryStore::new()),
            GasConfig::default(),
        )
        .with_chain("ethereum", rpc.clone(), ANVIL_ADDRESS, None)
        .with_chain("arbitrum", Arc::new(MockRpc::new()), ANVIL_ADDRESS, None);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(gas),
            Arc::new(keyring(&["ethereum", "arbitrum"])),
        ));
        let stargate = Arc::new(MockBridgeProtocol::new(STARGATE));
        let lifi = Arc::new(MockBridgeProtocol::new(LIFI));
        let calldata = Arc::new(CalldataProvider::new(vec![], vec![stargate.clone(), lifi.clone()]));
        let bridge = GasBridge::new(calldata, dispatcher);

        let hash = bridge.bridge_native("ethereum", "arbitrum", eth(1.46)).await.unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(lifi.calls(), 1, "native gas is not a stablecoin");
        assert_eq!(stargate.calls(), 0);
        assert_eq!(rpc.sent_count(), 1);

        assert!(bridge.bridge_native("ethereum", "arbitrum", U256::ZERO).await.is_err());
    }
}
