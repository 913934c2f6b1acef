//! Liquidator chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for the pool, oracle, data provider and liquidators
//! - A [`LendingPool`] reader over typed `eth_call`s
//! - Token classification (principal tokens, wrapper underlyings, decimals)
//! - Transaction signing and sending with a cached nonce

pub mod contracts;
mod error;
pub mod protocol;
mod signer;
mod tokens;

pub use contracts::{
    encode_swap_payload, LiquidateArgs, LiquidationSubmitter, LiquidatorContract, LiquidatorKind,
    SwapPayload,
};
pub use error::ExecutionError;
pub use protocol::{
    AaveV3Addresses, AaveV3Pool, LendingPool, ReserveConfig, ReserveTokens, UserAccountSnapshot,
    UserReserveData,
};
pub use signer::{NonceManager, TransactionSender, DEFAULT_LIQUIDATION_GAS_LIMIT};
pub use tokens::{OnchainTokenRegistry, TokenMetadataCache, TokenRegistry};
