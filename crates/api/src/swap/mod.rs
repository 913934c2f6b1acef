//! Swap aggregator abstraction.
//!
//! The liquidation pipeline needs three things from an aggregator: a quote
//! for an exact input amount, an executable transaction for that quote
//! addressed to a chosen receiver, and a spot USD price used to size inputs.
//!
//! # Example
//!
//! ```rust,ignore
//! use liquidator_api::swap::{OdosClient, QuoteRequest, SwapAggregator};
//!
//! let odos = OdosClient::new(chain_id);
//! let request = QuoteRequest::new(collateral, amount_in, debt_asset, liquidator)
//!     .with_slippage_bps(50);
//! let quote = odos.quote(&request).await?;
//! let tx = odos.assemble(&quote, liquidator).await?;
//! ```

mod odos;

pub use odos::OdosClient;

use crate::error::ApiError;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

/// Exact-input quote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    /// Input token address
    pub token_in: Address,
    /// Input amount (raw, with decimals)
    pub amount_in: U256,
    /// Output token address
    pub token_out: Address,
    /// Slippage tolerance in basis points (e.g., 50 = 0.5%)
    pub slippage_bps: u16,
    /// Address that will hold the input and execute the swap
    pub user: Address,
}

impl QuoteRequest {
    pub fn new(token_in: Address, amount_in: U256, token_out: Address, user: Address) -> Self {
        Self {
            token_in,
            amount_in,
            token_out,
            slippage_bps: 50,
            user,
        }
    }

    /// Set slippage tolerance.
    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }
}

/// Quote returned by the aggregator, valid for a short time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Aggregator handle for assembling this quote
    pub path_id: String,
    pub token_in: Address,
    pub amount_in: U256,
    pub token_out: Address,
    /// Expected output amount
    pub amount_out: U256,
    /// Aggregator gas estimate
    pub gas_estimate: u64,
    /// User the quote was requested for
    pub user: Address,
}

/// Ready-to-embed swap transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSwap {
    /// Router contract to call
    pub to: Address,
    /// Router calldata
    pub data: Bytes,
    /// Native value to attach (zero for token swaps)
    pub value: U256,
    /// Expected output amount reported by the assembler
    pub amount_out: U256,
}

/// Swap aggregator operations used by the quote assembler.
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Quote an exact-input swap.
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, ApiError>;

    /// Turn a quote into calldata whose output goes to `receiver`.
    async fn assemble(&self, quote: &Quote, receiver: Address) -> Result<AssembledSwap, ApiError>;

    /// Spot USD price of one whole token.
    async fn token_price(&self, token: Address) -> Result<f64, ApiError>;
}
