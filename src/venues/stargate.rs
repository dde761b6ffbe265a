// Stargate bridge adapter
// Encodes Stargate router swaps locally from pool ids and adds the quoted
// LayerZero messaging fee to the transaction value
//
// Numan Thabit 2025 Nov

use crate::chains;
use crate::errors::ExecError;
use crate::router::routes::RouteStep;
use crate::transport::ChainRpc;
use crate::venues::{receiver, BridgeProtocol, Calldata, STARGATE};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

sol! {
    struct lzTxObj {
        uint256 dstGasForCall;
        uint256 dstNativeAmount;
        bytes dstNativeAddr;
    }

    interface IStargateRouter {
        function swap(
            uint16 _dstChainId,
            uint256 _srcPoolId,
            uint256 _dstPoolId,
            address _refundAddress,
            uint256 _amountLD,
            uint256 _minAmountLD,
            lzTxObj _lzTxParams,
            bytes _to,
            bytes _payload
        ) external payable;

        function quoteLayerZeroFee(
            uint16 _dstChainId,
            uint8 _functionType,
            bytes _toAddress,
            bytes _transferAndCallPayload,
            lzTxObj _lzTxParams
        ) external view returns (uint256 nativeFee, uint256 zroFee);
    }
}

/// Router function type for a plain remote swap.
const TYPE_SWAP_REMOTE: u8 = 1;
const MIN_AMOUNT_BPS: u64 = 9_950;
const FEE_HEADROOM_PCT: u64 = 110;

pub struct Stargate {
    rpcs: HashMap<String, Arc<dyn ChainRpc>>,
}

impl Stargate {
    pub fn new(rpcs: HashMap<String, Arc<dyn ChainRpc>>) -> Self {
        Self { rpcs }
    }
}

/// Pool ids are shared across chains.
pub fn pool_id(symbol: &str) -> Option<u64> {
    match symbol.to_ascii_uppercase().as_str() {
        "USDC" => Some(1),
        "USDT" => Some(2),
        _ => None,
    }
}

fn empty_lz_params() -> lzTxObj {
    lzTxObj {
        dstGasForCall: U256::ZERO,
        dstNativeAmount: U256::ZERO,
        dstNativeAddr: Bytes::new(),
    }
}

/// Router call for `amount` with 50 bps of slippage allowance.
pub(crate) fn encode_swap(
    dst_lz_id: u16,
    src_pool: u64,
    dst_pool: u64,
    refund: Address,
    amount: U256,
    to: Address,
) -> Bytes {
    let min_amount = amount * U256::from(MIN_AMOUNT_BPS) / U256::from(10_000u64);
    let call = IStargateRouter::swapCall {
        _dstChainId: dst_lz_id,
        _srcPoolId: U256::from(src_pool),
        _dstPoolId: U256::from(dst_pool),
        _refundAddress: refund,
        _amountLD: amount,
        _minAmountLD: min_amount,
        _lzTxParams: empty_lz_params(),
        _to: Bytes::copy_from_slice(to.as_slice()),
        _payload: Bytes::new(),
    };
    Bytes::from(call.abi_encode())
}

pub(crate) fn with_fee_headroom(native_fee: U256) -> U256 {
    native_fee * U256::from(FEE_HEADROOM_PCT) / U256::from(100u64)
}

#[async_trait]
impl BridgeProtocol for Stargate {
    fn name(&self) -> &'static str {
        STARGATE
    }

    async fn bridge_calldata(&self, step: &RouteStep, from: Address) -> Result<Calldata, ExecError> {
        let unsupported = |what: String| ExecError::provider(STARGATE, what);
        let src = chains::chain_info(&step.from_chain)
            .ok_or_else(|| unsupported(format!("unsupported chain {}", step.from_chain)))?;
        let dst = chains::chain_info(&step.to_chain)
            .ok_or_else(|| unsupported(format!("unsupported chain {}", step.to_chain)))?;
        let router = src
            .stargate_router
            .ok_or_else(|| unsupported(format!("no router on {}", src.name)))?;
        let router = Address::from_str(router)
            .map_err(|e| unsupported(format!("bad router address: {e}")))?;
        let dst_lz_id = dst
            .layerzero_id
            .ok_or_else(|| unsupported(format!("no LayerZero endpoint for {}", dst.name)))?;
        let src_pool = pool_id(&step.from_token)
            .ok_or_else(|| unsupported(format!("no pool for {}", step.from_token)))?;
        let dst_pool = pool_id(&step.to_token)
            .ok_or_else(|| unsupported(format!("no pool for {}", step.to_token)))?;
        let rpc = self
            .rpcs
            .get(src.name)
            .ok_or_else(|| unsupported(format!("no rpc for {}", src.name)))?;

        let amount = step.amount_units()?;
        let to = receiver(step, from)?;

        let quote = IStargateRouter::quoteLayerZeroFeeCall {
            _dstChainId: dst_lz_id,
            _functionType: TYPE_SWAP_REMOTE,
            _toAddress: Bytes::copy_from_slice(to.as_slice()),
            _transferAndCallPayload: Bytes::new(),
            _lzTxParams: empty_lz_params(),
        };
        let raw = rpc.call(router, Bytes::from(quote.abi_encode())).await?;
        let fees = IStargateRouter::quoteLayerZeroFeeCall::abi_decode_returns(&raw)
            .map_err(|e| unsupported(format!("decode LayerZero fee: {e}")))?;

        Ok(Calldata {
            to: router,
            data: encode_swap(dst_lz_id, src_pool, dst_pool, from, amount, to),
            value: with_fee_headroom(fees.nativeFee),
            gas_limit: None,
            provider: STARGATE.to_string(),
        })
    }
}
