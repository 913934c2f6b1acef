//! Liquidation sizing: reserve selection, maximum repay and expected profit.
//!
//! All amounts are integers. Values are expressed in the oracle's base
//! currency (8 decimals); the health factor and close-factor threshold are wad.

use alloy::primitives::U256;

use crate::position::UserReserve;
use crate::u256_math::{self, MathResult, PERCENTAGE_FACTOR, WAD};

/// Share of the debt repayable while the health factor is above the
/// close-factor threshold.
pub const DEFAULT_CLOSE_FACTOR_BPS: u32 = 5_000;

/// Full close factor, used below the threshold.
pub const MAX_CLOSE_FACTOR_BPS: u32 = 10_000;

/// Inputs to [`compute_max_repay`].
#[derive(Debug, Clone, Copy)]
pub struct SizingInput {
    /// Health factor (wad)
    pub health_factor: U256,
    /// Close-factor threshold (wad)
    pub close_factor_threshold: U256,
    /// Outstanding debt on the chosen debt reserve (asset units)
    pub total_debt: U256,
    /// Debt asset oracle price (base currency)
    pub debt_price: U256,
    pub debt_decimals: u8,
    /// Collateral value available to seize (base currency)
    pub collateral_value: U256,
    /// Liquidation bonus of the collateral reserve (bps, > 10000)
    pub liquidation_bonus_bps: u16,
}

/// Largest debt value among repayable reserves; ties keep the first.
pub fn select_debt_reserve(reserves: &[UserReserve]) -> MathResult<Option<UserReserve>> {
    select_largest(reserves, UserReserve::is_repayable, UserReserve::debt_value)
}

/// Largest supplied value among seizable reserves; ties keep the first.
pub fn select_collateral_reserve(reserves: &[UserReserve]) -> MathResult<Option<UserReserve>> {
    select_largest(reserves, UserReserve::is_seizable, UserReserve::supplied_value)
}

fn select_largest(
    reserves: &[UserReserve],
    eligible: fn(&UserReserve) -> bool,
    value: fn(&UserReserve) -> MathResult<U256>,
) -> MathResult<Option<UserReserve>> {
    let mut best: Option<(U256, UserReserve)> = None;
    for reserve in reserves.iter().filter(|r| eligible(r)) {
        let v = value(reserve)?;
        match &best {
            Some((best_value, _)) if v <= *best_value => {}
            _ => best = Some((v, *reserve)),
        }
    }
    Ok(best.map(|(_, r)| r))
}

/// Maximum debt to repay, in debt-asset units.
///
/// 1. Zero when the position is healthy (health factor >= 1).
/// 2. 50% of the debt, or 100% below the close-factor threshold.
/// 3. Clamped so the bonus-inflated value never exceeds `collateral_value`.
pub fn compute_max_repay(input: &SizingInput) -> MathResult<U256> {
    if input.health_factor >= WAD || input.total_debt.is_zero() {
        return Ok(U256::ZERO);
    }

    let close_factor = if input.health_factor < input.close_factor_threshold {
        MAX_CLOSE_FACTOR_BPS
    } else {
        DEFAULT_CLOSE_FACTOR_BPS
    };
    let repay = u256_math::percent_mul(input.total_debt, close_factor)?;

    let bonus = u32::from(input.liquidation_bonus_bps);
    let repay_value = u256_math::base_value(repay, input.debt_price, input.debt_decimals)?;
    let seize_value = u256_math::percent_mul(repay_value, bonus)?;

    if seize_value <= input.collateral_value {
        return Ok(repay);
    }

    // Solve percent_mul(value, bonus) == collateral_value for the repay value.
    let max_repay_value = u256_math::percent_div(input.collateral_value, bonus)?;
    let clamped = u256_math::amount_from_base_value(max_repay_value, input.debt_price, input.debt_decimals)?;
    Ok(clamped.min(repay))
}

/// Liquidation bonus earned for repaying `repay` (base currency).
pub fn compute_profit(
    repay: U256,
    debt_price: U256,
    debt_decimals: u8,
    liquidation_bonus_bps: u16,
) -> MathResult<U256> {
    let premium_bps = u32::from(liquidation_bonus_bps).saturating_sub(PERCENTAGE_FACTOR);
    let repay_value = u256_math::base_value(repay, debt_price, debt_decimals)?;
    u256_math::mul_div(repay_value, U256::from(premium_bps), U256::from(PERCENTAGE_FACTOR))
}

/// Whether `profit_base` meets the USD threshold.
pub fn is_profitable(profit_base: U256, min_profit_usd: f64) -> bool {
    profit_base >= u256_math::usd_to_base(min_profit_usd)
}
