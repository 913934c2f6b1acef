//! Per-borrower failure taxonomy.

use alloy::primitives::Address;
use liquidator_api::ApiError;
use liquidator_chain::ExecutionError;
use std::fmt;
use thiserror::Error;

use crate::u256_math::MathError;

/// Pipeline step, reported with failures and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    AccountData,
    ReserveData,
    CloseFactor,
    ResolveWrapper,
    ClassifyCollateral,
    TokenDecimals,
    PriceEstimate,
    AggregatorQuote,
    AggregatorAssemble,
    MarketDiscovery,
    RedeemQuote,
    UnderlyingQuote,
    UnderlyingAssemble,
    Execute,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountData => "account_data",
            Self::ReserveData => "reserve_data",
            Self::CloseFactor => "close_factor",
            Self::ResolveWrapper => "resolve_wrapper",
            Self::ClassifyCollateral => "classify_collateral",
            Self::TokenDecimals => "token_decimals",
            Self::PriceEstimate => "price_estimate",
            Self::AggregatorQuote => "aggregator_quote",
            Self::AggregatorAssemble => "aggregator_assemble",
            Self::MarketDiscovery => "market_discovery",
            Self::RedeemQuote => "redeem_quote",
            Self::UnderlyingQuote => "underlying_quote",
            Self::UnderlyingAssemble => "underlying_assemble",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a borrower's attempt stopped.
#[derive(Debug, Error)]
pub enum LiquidationError {
    /// RPC or HTTP noise; the borrower is retried next cycle.
    #[error("transient failure at {step}: {message}")]
    Transient { step: Step, message: String },

    /// A quote or assembly service refused the trade.
    #[error("swap assembly failed at {step}: {message}")]
    SwapAssembly { step: Step, message: String },

    /// The liquidation transaction failed to submit or reverted.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The chosen collateral cannot be liquidated by this bot.
    #[error("unsupported collateral {asset}: {reason}")]
    UnsupportedCollateral { asset: Address, reason: String },

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

impl LiquidationError {
    /// Classify an upstream service failure.
    pub fn from_api(step: Step, err: ApiError) -> Self {
        if err.is_retryable() {
            Self::Transient {
                step,
                message: err.to_string(),
            }
        } else {
            Self::SwapAssembly {
                step,
                message: err.to_string(),
            }
        }
    }

    /// Wrap an RPC failure.
    pub fn transient(step: Step, err: impl fmt::Display) -> Self {
        Self::Transient {
            step,
            message: err.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether the borrower should be muted after this failure.
    pub fn should_backoff(&self) -> bool {
        !self.is_transient()
    }

    /// Step that failed, when known.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Transient { step, .. } | Self::SwapAssembly { step, .. } => Some(*step),
            Self::Execution(_) => Some(Step::Execute),
            Self::UnsupportedCollateral { .. } | Self::Math(_) => None,
        }
    }

    /// Short machine-readable category for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::SwapAssembly { .. } => "swap_assembly",
            Self::Execution(_) => "execution",
            Self::UnsupportedCollateral { .. } => "unsupported_collateral",
            Self::Math(_) => "math",
        }
    }
}
