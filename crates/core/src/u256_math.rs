//! Fixed-point arithmetic for liquidation sizing.
//!
//! Percentages are basis points (10000 = 100%), `wad` values carry 18
//! decimals and `ray` values 27. Every operation rounds half up, matching the
//! lending protocol's own math, and has an explicit ceiling variant where a
//! caller needs to round against itself. Division by zero and overflow are
//! reported as [`MathError`] instead of wrapping or saturating.
//!
//! Floating point appears only in the display/config helpers at the bottom.

use alloy::primitives::U256;
use thiserror::Error;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Half WAD, used for round-half-up
pub const HALF_WAD: U256 = U256::from_limbs([500_000_000_000_000_000u64, 0, 0, 0]);

/// RAY constant: 1e27 for 27-decimal fixed-point arithmetic
pub const RAY: U256 = U256::from_limbs([
    (1_000_000_000_000_000_000_000_000_000u128 & 0xFFFF_FFFF_FFFF_FFFF) as u64,
    (1_000_000_000_000_000_000_000_000_000u128 >> 64) as u64,
    0,
    0,
]);

/// Half RAY, used for round-half-up
pub const HALF_RAY: U256 = U256::from_limbs([
    (500_000_000_000_000_000_000_000_000u128 & 0xFFFF_FFFF_FFFF_FFFF) as u64,
    (500_000_000_000_000_000_000_000_000u128 >> 64) as u64,
    0,
    0,
]);

/// WAD / RAY ratio
const WAD_RAY_RATIO: U256 = U256::from_limbs([1_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const PERCENTAGE_FACTOR: u32 = 10_000;

/// Oracle price decimals (base currency is quoted with 8 decimals)
pub const PRICE_DECIMALS: u8 = 8;

/// One unit of the oracle base currency
pub const BASE_CURRENCY_UNIT: U256 = U256::from_limbs([100_000_000u64, 0, 0, 0]);

/// Arithmetic domain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

pub type MathResult<T> = Result<T, MathError>;

/// 10^exp. Exponents above 77 do not fit in 256 bits.
#[inline]
pub fn pow10(exp: u8) -> MathResult<U256> {
    U256::from(10u64)
        .checked_pow(U256::from(exp))
        .ok_or(MathError::Overflow)
}

#[inline]
fn mul(a: U256, b: U256) -> MathResult<U256> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

#[inline]
fn add(a: U256, b: U256) -> MathResult<U256> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// `a * b / denominator`, rounded down.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> MathResult<U256> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(mul(a, b)? / denominator)
}

/// `a * b / denominator`, rounded up.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> MathResult<U256> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = mul(a, b)?;
    let quotient = product / denominator;
    if (product % denominator).is_zero() {
        Ok(quotient)
    } else {
        add(quotient, U256::from(1u8))
    }
}

/// Ceiling division.
pub fn div_up(a: U256, b: U256) -> MathResult<U256> {
    mul_div_up(a, U256::from(1u8), b)
}

// ============================================================================
// Percentage math (basis points)
// ============================================================================

/// `value * bps / 10000`, rounded half up.
pub fn percent_mul(value: U256, bps: u32) -> MathResult<U256> {
    if value.is_zero() || bps == 0 {
        return Ok(U256::ZERO);
    }
    let half = U256::from(PERCENTAGE_FACTOR / 2);
    Ok(add(mul(value, U256::from(bps))?, half)? / U256::from(PERCENTAGE_FACTOR))
}

/// `value * bps / 10000`, rounded up.
pub fn percent_mul_up(value: U256, bps: u32) -> MathResult<U256> {
    if value.is_zero() || bps == 0 {
        return Ok(U256::ZERO);
    }
    mul_div_up(value, U256::from(bps), U256::from(PERCENTAGE_FACTOR))
}

/// `value * 10000 / bps`, rounded half up.
pub fn percent_div(value: U256, bps: u32) -> MathResult<U256> {
    if bps == 0 {
        return Err(MathError::DivisionByZero);
    }
    let bps = U256::from(bps);
    let half = bps / U256::from(2u8);
    Ok(add(mul(value, U256::from(PERCENTAGE_FACTOR))?, half)? / bps)
}

/// `value * 10000 / bps`, rounded up.
pub fn percent_div_up(value: U256, bps: u32) -> MathResult<U256> {
    if bps == 0 {
        return Err(MathError::DivisionByZero);
    }
    mul_div_up(value, U256::from(PERCENTAGE_FACTOR), U256::from(bps))
}

// ============================================================================
// WAD / RAY math
// ============================================================================

/// Multiply two WAD values, rounded half up.
pub fn wad_mul(a: U256, b: U256) -> MathResult<U256> {
    if a.is_zero() || b.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok(add(mul(a, b)?, HALF_WAD)? / WAD)
}

/// Multiply two WAD values, rounded up.
pub fn wad_mul_up(a: U256, b: U256) -> MathResult<U256> {
    if a.is_zero() || b.is_zero() {
        return Ok(U256::ZERO);
    }
    mul_div_up(a, b, WAD)
}

/// Divide two WAD values, rounded half up.
pub fn wad_div(a: U256, b: U256) -> MathResult<U256> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let half = b / U256::from(2u8);
    Ok(add(mul(a, WAD)?, half)? / b)
}

/// Divide two WAD values, rounded up.
pub fn wad_div_up(a: U256, b: U256) -> MathResult<U256> {
    mul_div_up(a, WAD, b)
}

/// Multiply two RAY values, rounded half up.
pub fn ray_mul(a: U256, b: U256) -> MathResult<U256> {
    if a.is_zero() || b.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok(add(mul(a, b)?, HALF_RAY)? / RAY)
}

/// Multiply two RAY values, rounded up.
pub fn ray_mul_up(a: U256, b: U256) -> MathResult<U256> {
    if a.is_zero() || b.is_zero() {
        return Ok(U256::ZERO);
    }
    mul_div_up(a, b, RAY)
}

/// Divide two RAY values, rounded half up.
pub fn ray_div(a: U256, b: U256) -> MathResult<U256> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let half = b / U256::from(2u8);
    Ok(add(mul(a, RAY)?, half)? / b)
}

/// Divide two RAY values, rounded up.
pub fn ray_div_up(a: U256, b: U256) -> MathResult<U256> {
    mul_div_up(a, RAY, b)
}

/// RAY to WAD, rounded half up.
pub fn ray_to_wad(a: U256) -> U256 {
    let half = WAD_RAY_RATIO / U256::from(2u8);
    let quotient = a / WAD_RAY_RATIO;
    if a % WAD_RAY_RATIO >= half {
        quotient.saturating_add(U256::from(1u8))
    } else {
        quotient
    }
}

/// WAD to RAY.
pub fn wad_to_ray(a: U256) -> MathResult<U256> {
    mul(a, WAD_RAY_RATIO)
}

// ============================================================================
// Token amounts and base-currency values
// ============================================================================

/// Value of `amount` (token units) at `price` (base currency, 8 decimals),
/// in base currency units, rounded down.
pub fn base_value(amount: U256, price: U256, decimals: u8) -> MathResult<U256> {
    if amount.is_zero() || price.is_zero() {
        return Ok(U256::ZERO);
    }
    mul_div(amount, price, pow10(decimals)?)
}

/// Token amount worth `value` base currency units at `price`, rounded down.
pub fn amount_from_base_value(value: U256, price: U256, decimals: u8) -> MathResult<U256> {
    mul_div(value, pow10(decimals)?, price)
}

/// Re-scale an amount between decimal precisions (rounded down when shrinking).
pub fn convert_decimals(amount: U256, from: u8, to: u8) -> MathResult<U256> {
    if from == to {
        Ok(amount)
    } else if from < to {
        mul(amount, pow10(to - from)?)
    } else {
        // Shrinking by more than 77 places leaves nothing.
        Ok(pow10(from - to).map_or(U256::ZERO, |unit| amount / unit))
    }
}

// ============================================================================
// Display / configuration conversions
// ============================================================================

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging and threshold comparison, not for amounts.
pub fn wad_to_f64(wad: U256) -> f64 {
    scaled_to_f64(wad, 18)
}

/// Convert base currency units (8 decimals) to f64 USD.
pub fn base_to_f64(value: U256) -> f64 {
    scaled_to_f64(value, PRICE_DECIMALS)
}

fn scaled_to_f64(value: U256, decimals: u8) -> f64 {
    let Ok(unit) = pow10(decimals) else {
        return 0.0;
    };
    let whole = value / unit;
    let frac = value % unit;
    let whole = if whole > U256::from(u128::MAX) {
        f64::MAX
    } else {
        whole.saturating_to::<u128>() as f64
    };
    whole + frac.saturating_to::<u128>() as f64 / 10f64.powi(i32::from(decimals))
}

/// Convert f64 to WAD (18 decimals).
/// Non-finite and non-positive inputs map to zero.
pub fn f64_to_wad(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// Convert a USD amount to base currency units (8 decimals).
pub fn usd_to_base(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e8).round() as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_constants() {
        assert_eq!(RAY, pow10(27).unwrap());
        assert_eq!(HALF_RAY * u(2), RAY);
        assert_eq!(WAD, pow10(18).unwrap());
        assert_eq!(WAD_RAY_RATIO, pow10(9).unwrap());
    }

    #[test]
    fn test_percent_mul_rounds_half_up() {
        assert_eq!(percent_mul(u(1000), 10500).unwrap(), u(1050));
        // 3 * 5000 / 10000 = 1.5 -> 2
        assert_eq!(percent_mul(u(3), 5000).unwrap(), u(2));
        // 1 * 4999 / 10000 = 0.4999 -> 0
        assert_eq!(percent_mul(u(1), 4999).unwrap(), u(0));
        assert_eq!(percent_mul_up(u(1), 1).unwrap(), u(1));
    }

    #[test]
    fn test_percent_mul_zero_short_circuit() {
        assert_eq!(percent_mul(U256::ZERO, 10500).unwrap(), U256::ZERO);
        assert_eq!(percent_mul(U256::MAX, 0).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_percent_div() {
        assert_eq!(percent_div(u(1050), 10500).unwrap(), u(1000));
        assert_eq!(percent_div(u(900), 10500).unwrap(), u(857));
        assert_eq!(percent_div_up(u(900), 10500).unwrap(), u(858));
    }

    #[test]
    fn test_division_by_zero_is_error() {
        assert_eq!(percent_div(u(1), 0), Err(MathError::DivisionByZero));
        assert_eq!(percent_div_up(u(1), 0), Err(MathError::DivisionByZero));
        assert_eq!(wad_div(u(1), U256::ZERO), Err(MathError::DivisionByZero));
        assert_eq!(ray_div(u(1), U256::ZERO), Err(MathError::DivisionByZero));
        assert_eq!(wad_div_up(u(1), U256::ZERO), Err(MathError::DivisionByZero));
        assert_eq!(
            amount_from_base_value(u(1), U256::ZERO, 18),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_overflow_is_error() {
        assert_eq!(percent_mul(U256::MAX, 2), Err(MathError::Overflow));
        assert_eq!(wad_mul(U256::MAX, WAD + u(1)), Err(MathError::Overflow));
    }

    #[test]
    fn test_percent_round_trip_within_one_unit() {
        let values = [1u128, 7, 999, 1_000_000, 123_456_789_012_345_678, 10u128.pow(30)];
        let percentages = [1u32, 50, 5000, 9999, 10_000, 10_500, 11_000, 15_000];
        for &v in &values {
            for &p in &percentages {
                let x = u(v);
                let back = percent_div(percent_mul(x, p).unwrap(), p).unwrap();
                let diff = if back > x { back - x } else { x - back };
                // Rounding in percent_mul is amplified by 10000/p on the way back.
                let tolerance = u(u128::from(PERCENTAGE_FACTOR / p + 1));
                assert!(diff <= tolerance, "v={v} p={p} back={back}");
            }
        }
    }

    #[test]
    fn test_wad_ops() {
        let two = u(2) * WAD;
        let three = u(3) * WAD;
        assert_eq!(wad_mul(two, three).unwrap(), u(6) * WAD);
        assert_eq!(wad_div(three, two).unwrap(), u(1_500_000_000_000_000_000));
        // 1 / 3 wad rounds half up at the last digit
        assert_eq!(wad_div(WAD, three).unwrap(), u(333_333_333_333_333_333));
        assert_eq!(wad_div_up(WAD, three).unwrap(), u(333_333_333_333_333_334));
        assert_eq!(wad_mul_up(u(1), u(1)).unwrap(), u(1));
        assert_eq!(wad_mul(u(1), u(1)).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_ray_ops() {
        let half = RAY / u(2);
        assert_eq!(ray_mul(half, u(4) * RAY).unwrap(), u(2) * RAY);
        assert_eq!(ray_div(RAY, u(4) * RAY).unwrap(), RAY / u(4));
        assert_eq!(ray_div_up(u(1), u(3) * RAY).unwrap(), u(1));
        assert_eq!(ray_mul_up(u(1), u(1)).unwrap(), u(1));
        assert_eq!(ray_to_wad(RAY), WAD);
        assert_eq!(ray_to_wad(u(500_000_000)), u(1));
        assert_eq!(ray_to_wad(u(499_999_999)), U256::ZERO);
        assert_eq!(wad_to_ray(WAD).unwrap(), RAY);
    }

    #[test]
    fn test_mul_div_up() {
        assert_eq!(mul_div_up(u(10), u(1), u(3)).unwrap(), u(4));
        assert_eq!(mul_div_up(u(9), u(1), u(3)).unwrap(), u(3));
        assert_eq!(div_up(u(1), u(2)).unwrap(), u(1));
        assert_eq!(mul_div(u(10), u(1), u(3)).unwrap(), u(3));
    }

    #[test]
    fn test_base_value() {
        // 1000 USDC (6 decimals) at $1.00
        let value = base_value(u(1_000_000_000), u(100_000_000), 6).unwrap();
        assert_eq!(value, u(1000) * BASE_CURRENCY_UNIT);

        // 1.5 ETH at $2000
        let value = base_value(u(1_500_000_000_000_000_000), u(200_000_000_000), 18).unwrap();
        assert_eq!(value, u(3000) * BASE_CURRENCY_UNIT);

        let amount = amount_from_base_value(u(3000) * BASE_CURRENCY_UNIT, u(200_000_000_000), 18).unwrap();
        assert_eq!(amount, u(1_500_000_000_000_000_000));
    }

    #[test]
    fn test_convert_decimals() {
        assert_eq!(convert_decimals(u(1_000_000), 6, 18).unwrap(), pow10(18).unwrap());
        assert_eq!(convert_decimals(WAD + u(1), 18, 6).unwrap(), u(1_000_000));
        assert_eq!(convert_decimals(u(5), 8, 8).unwrap(), u(5));
    }

    #[test]
    fn test_oversized_decimals_overflow() {
        assert!(pow10(77).is_ok());
        assert_eq!(pow10(78), Err(MathError::Overflow));
        assert_eq!(base_value(u(1), u(1), 100), Err(MathError::Overflow));
        assert_eq!(amount_from_base_value(u(1), u(1), 78), Err(MathError::Overflow));
        assert_eq!(convert_decimals(u(1), 0, 80), Err(MathError::Overflow));
        assert_eq!(convert_decimals(WAD, 100, 0).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_f64_conversions() {
        assert!((wad_to_f64(u(1000) * WAD) - 1000.0).abs() < 1e-9);
        assert!((wad_to_f64(u(950_000_000_000_000_000)) - 0.95).abs() < 1e-12);
        assert!((base_to_f64(u(2_500_000_000)) - 25.0).abs() < 1e-12);
        assert_eq!(f64_to_wad(0.5), u(500_000_000_000_000_000));
        assert_eq!(f64_to_wad(-1.0), U256::ZERO);
        assert_eq!(f64_to_wad(f64::NAN), U256::ZERO);
        assert_eq!(usd_to_base(30.0), u(3_000_000_000));
        assert_eq!(usd_to_base(0.01), u(1_000_000));
    }
}
