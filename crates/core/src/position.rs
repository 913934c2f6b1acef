//! Position data structures for one borrower.

use alloy::primitives::{Address, U256};
use liquidator_chain::{ReserveConfig, ReserveTokens};
use smallvec::SmallVec;

use crate::u256_math::{self, MathResult};

/// Reserve metadata shared by every borrower within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveInfo {
    pub config: ReserveConfig,
    pub tokens: ReserveTokens,
}

impl ReserveInfo {
    pub fn asset(&self) -> Address {
        self.config.asset
    }
}

/// A borrower's balances on one reserve, priced by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserReserve {
    pub reserve: ReserveInfo,
    /// Oracle price (base currency, 8 decimals)
    pub price: U256,
    /// Receipt-token balance (asset units)
    pub supplied: U256,
    /// Stable + variable debt (asset units)
    pub debt: U256,
    /// The user has enabled this reserve as collateral
    pub usage_as_collateral_enabled: bool,
}

impl UserReserve {
    pub fn asset(&self) -> Address {
        self.reserve.config.asset
    }

    pub fn decimals(&self) -> u8 {
        self.reserve.config.decimals
    }

    pub fn liquidation_bonus_bps(&self) -> u16 {
        self.reserve.config.liquidation_bonus_bps
    }

    /// Supplied balance in base currency.
    pub fn supplied_value(&self) -> MathResult<U256> {
        u256_math::base_value(self.supplied, self.price, self.decimals())
    }

    /// Outstanding debt in base currency.
    pub fn debt_value(&self) -> MathResult<U256> {
        u256_math::base_value(self.debt, self.price, self.decimals())
    }

    /// Whether this reserve can be seized: collateral-enabled at both the
    /// protocol and user level, with a non-zero bonus and a balance.
    pub fn is_seizable(&self) -> bool {
        self.reserve.config.usage_as_collateral_enabled
            && self.usage_as_collateral_enabled
            && self.reserve.config.liquidation_bonus_bps > 0
            && !self.supplied.is_zero()
    }

    /// Whether this reserve holds repayable debt.
    pub fn is_repayable(&self) -> bool {
        self.reserve.config.borrowing_enabled && !self.debt.is_zero()
    }
}

/// All non-empty reserves of one borrower.
pub type UserReserves = SmallVec<[UserReserve; 8]>;

/// A borrower flagged for liquidation with a sized repayment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationCandidate {
    pub user: Address,
    /// Health factor (wad)
    pub health_factor: U256,
    pub collateral: UserReserve,
    pub debt: UserReserve,
    /// Debt to repay, in debt-asset units
    pub debt_to_cover: U256,
    /// Expected bonus, in base currency
    pub profit_base: U256,
}

impl LiquidationCandidate {
    pub fn health_factor_f64(&self) -> f64 {
        u256_math::wad_to_f64(self.health_factor)
    }

    pub fn profit_usd(&self) -> f64 {
        u256_math::base_to_f64(self.profit_base)
    }
}
