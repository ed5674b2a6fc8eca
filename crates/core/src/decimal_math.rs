//! Decimal arithmetic for values that cross a token-decimals boundary.
//!
//! Raw on-chain amounts are `U256` integers. Anything compared across assets
//! (native values, health factors) is a `rust_decimal::Decimal`, which is
//! exact for the base-10 scaling done here and never yields NaN or infinity:
//! every fallible step returns a `MathError` instead.

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::error::MathError;

/// Maximum scale (fractional digits) a `Decimal` supports.
pub const MAX_SCALE: u32 = 28;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Largest mantissa a `Decimal` can hold (2^96 - 1).
const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

/// 10^exp as a decimal.
pub fn pow10(exp: u32) -> Result<Decimal, MathError> {
    if exp > MAX_SCALE {
        return Err(MathError::Scale(exp));
    }
    let mut value = Decimal::ONE;
    for _ in 0..exp {
        value = value
            .checked_mul(Decimal::TEN)
            .ok_or_else(|| MathError::Overflow(format!("10^{exp}")))?;
    }
    Ok(value)
}

/// `value / 10^decimals`.
pub fn scale_down(value: Decimal, decimals: u32) -> Result<Decimal, MathError> {
    value
        .checked_div(pow10(decimals)?)
        .ok_or_else(|| MathError::Overflow(value.to_string()))
}

/// Convert a raw integer to a decimal, interpreting it as `value * 10^-scale`.
///
/// Values wider than the 96-bit mantissa lose their least significant digits,
/// which stays within decimal precision.
pub fn u256_to_decimal(value: U256, scale: u32) -> Result<Decimal, MathError> {
    if scale > MAX_SCALE {
        return Err(MathError::Scale(scale));
    }

    let max = U256::from(MAX_MANTISSA);
    let ten = U256::from(10u8);
    let mut mantissa = value;
    let mut scale = scale as i64;
    while mantissa > max {
        mantissa /= ten;
        scale -= 1;
    }

    let m = mantissa.to::<u128>() as i128;
    if scale >= 0 {
        Decimal::try_from_i128_with_scale(m, scale as u32)
            .map_err(|_| MathError::Overflow(value.to_string()))
    } else {
        let exp = u32::try_from(-scale).map_err(|_| MathError::Overflow(value.to_string()))?;
        Decimal::try_from_i128_with_scale(m, 0)
            .ok()
            .and_then(|d| pow10(exp).ok().and_then(|p| d.checked_mul(p)))
            .ok_or_else(|| MathError::Overflow(value.to_string()))
    }
}

/// `numerator / denominator` as a decimal.
pub fn ratio(numerator: U256, denominator: U256) -> Result<Decimal, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let n = u256_to_decimal(numerator, 0)?;
    let d = u256_to_decimal(denominator, 0)?;
    n.checked_div(d)
        .ok_or_else(|| MathError::Overflow(numerator.to_string()))
}

/// Basis points as a fraction (8000 -> 0.8).
pub fn bps_fraction(bps: u16) -> Decimal {
    Decimal::new(bps as i64, 4)
}

/// Value of a raw token amount in native units: `principal / rate / 10^decimals`,
/// where `rate` is units of the token per 1 native unit.
pub fn native_value(principal: U256, rate: Decimal, decimals: u8) -> Result<Decimal, MathError> {
    if rate.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let amount = u256_to_decimal(principal, decimals as u32)?;
    amount
        .checked_div(rate)
        .ok_or_else(|| MathError::Overflow(principal.to_string()))
}

/// `value * bps / 10000`, rounding down.
pub fn apply_bps(value: U256, bps: u16) -> U256 {
    value.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR)
}
