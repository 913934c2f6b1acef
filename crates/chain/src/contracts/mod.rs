//! Liquidator contract handles.
//!
//! Two liquidator deployments exist: one funds the repayment by flash-minting
//! the debt asset, the other flash-borrows it from the pool. Both expose the
//! same `liquidate(...)` entry point, so a single [`LiquidatorContract`]
//! wrapper tagged with its [`LiquidatorKind`] covers both.

pub mod bindings;

pub use bindings::{
    IAaveOracle, IERC20, IERC4626, ILiquidationLogic, ILiquidator, IPool, IPoolDataProvider,
    IPtRegistry, SwapPayload,
};

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ExecutionError;

/// How the liquidator obtains the debt asset for the repayment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiquidatorKind {
    /// Mints the debt asset transiently (protocol stablecoins only)
    FlashMint,
    /// Borrows the debt asset from the pool
    FlashLoan,
}

impl fmt::Display for LiquidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlashMint => write!(f, "flash-mint"),
            Self::FlashLoan => write!(f, "flash-loan"),
        }
    }
}

/// Submits a fully encoded call from the operator wallet and waits for it to be mined.
#[async_trait]
pub trait LiquidationSubmitter: Send + Sync {
    /// Operator wallet address.
    fn sender_address(&self) -> Address;

    /// Send `calldata` to `to` and return the hash once the receipt shows success.
    async fn submit(&self, to: Address, calldata: Bytes) -> Result<B256, ExecutionError>;
}

/// Encode the swap legs into the payload layout the liquidators decode.
///
/// Unused legs are passed as `Address::ZERO` with empty calldata.
pub fn encode_swap_payload(
    pendle_target: Address,
    pendle_data: Bytes,
    aggregator_target: Address,
    aggregator_data: Bytes,
) -> Bytes {
    let payload = SwapPayload {
        pendleTarget: pendle_target,
        pendleData: pendle_data,
        aggregatorTarget: aggregator_target,
        aggregatorData: aggregator_data,
    };
    Bytes::from(payload.abi_encode())
}

/// Arguments of one `liquidate(...)` call.
#[derive(Debug, Clone)]
pub struct LiquidateArgs {
    /// Receipt token of the collateral reserve
    pub collateral_a_token: Address,
    /// Receipt token of the debt reserve
    pub debt_a_token: Address,
    /// Borrower being liquidated
    pub user: Address,
    /// Debt to repay, in debt-asset units
    pub debt_to_cover: U256,
    /// Whether the seized collateral must be unwrapped before swapping
    pub unstake: bool,
    /// Encoded [`SwapPayload`]
    pub swap_payload: Bytes,
}

/// A deployed liquidator contract of a given kind.
#[derive(Clone)]
pub struct LiquidatorContract {
    /// Flash-mint or flash-loan deployment
    pub kind: LiquidatorKind,
    /// Contract address; also the receiver of every swap leg
    pub address: Address,
    submitter: Arc<dyn LiquidationSubmitter>,
}

impl fmt::Debug for LiquidatorContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiquidatorContract")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("sender", &self.submitter.sender_address())
            .finish()
    }
}

impl LiquidatorContract {
    pub fn new(kind: LiquidatorKind, address: Address, submitter: Arc<dyn LiquidationSubmitter>) -> Self {
        Self {
            kind,
            address,
            submitter,
        }
    }

    /// Encode `liquidate(...)` calldata. The collateral is always received as
    /// the underlying asset, never as the receipt token.
    pub fn encode_liquidate(&self, args: &LiquidateArgs) -> Bytes {
        let call = ILiquidator::liquidateCall {
            collateralAToken: args.collateral_a_token,
            debtAToken: args.debt_a_token,
            user: args.user,
            debtToCover: args.debt_to_cover,
            receiveAToken: false,
            unstake: args.unstake,
            swapData: args.swap_payload.clone(),
        };
        Bytes::from(call.abi_encode())
    }

    /// Send the liquidation and wait for the receipt.
    pub async fn liquidate(&self, args: &LiquidateArgs) -> Result<B256, ExecutionError> {
        let encode_start = Instant::now();
        let calldata = self.encode_liquidate(args);
        let encode_elapsed = encode_start.elapsed();

        tracing::info!(
            contract = %self.address,
            kind = %self.kind,
            user = %args.user,
            debt_to_cover = %args.debt_to_cover,
            unstake = args.unstake,
            encode_us = encode_elapsed.as_micros(),
            calldata_len = calldata.len(),
            "[CONTRACT] Sending liquidation"
        );

        self.submitter.submit(self.address, calldata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSubmitter {
        sent: Mutex<Vec<(Address, Bytes)>>,
    }

    #[async_trait]
    impl LiquidationSubmitter for RecordingSubmitter {
        fn sender_address(&self) -> Address {
            Address::repeat_byte(0xee)
        }

        async fn submit(&self, to: Address, calldata: Bytes) -> Result<B256, ExecutionError> {
            self.sent.lock().push((to, calldata));
            Ok(B256::repeat_byte(0xab))
        }
    }

    fn args() -> LiquidateArgs {
        LiquidateArgs {
            collateral_a_token: Address::repeat_byte(1),
            debt_a_token: Address::repeat_byte(2),
            user: Address::repeat_byte(3),
            debt_to_cover: U256::from(500u64),
            unstake: false,
            swap_payload: encode_swap_payload(
                Address::ZERO,
                Bytes::new(),
                Address::repeat_byte(4),
                Bytes::from(vec![1, 2]),
            ),
        }
    }

    #[test]
    fn test_encode_liquidate_never_receives_a_token() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let contract = LiquidatorContract::new(LiquidatorKind::FlashLoan, Address::repeat_byte(7), submitter);

        let calldata = contract.encode_liquidate(&args());
        let decoded = ILiquidator::liquidateCall::abi_decode(&calldata, true).unwrap();
        assert!(!decoded.receiveAToken);
        assert_eq!(decoded.debtToCover, U256::from(500u64));

        let payload = SwapPayload::abi_decode(&decoded.swapData, true).unwrap();
        assert_eq!(payload.pendleTarget, Address::ZERO);
        assert!(payload.pendleData.is_empty());
        assert_eq!(payload.aggregatorTarget, Address::repeat_byte(4));
    }

    #[tokio::test]
    async fn test_liquidate_sends_to_contract_address() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let contract = LiquidatorContract::new(
            LiquidatorKind::FlashMint,
            Address::repeat_byte(7),
            submitter.clone(),
        );

        let hash = contract.liquidate(&args()).await.unwrap();
        assert_eq!(hash, B256::repeat_byte(0xab));

        let sent = submitter.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Address::repeat_byte(7));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(LiquidatorKind::FlashMint.to_string(), "flash-mint");
        assert_eq!(LiquidatorKind::FlashLoan.to_string(), "flash-loan");
    }
}
