//! Constant product AMM math (x·y=k)

use crate::{AmmError, Result};

/// Outcome of a single swap leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegResult {
    /// Amount of the output asset leaving the pool
    pub amount_out: u128,

    /// Input-side reserve after the leg
    pub reserve_in: u128,

    /// Output-side reserve after the leg
    pub reserve_out: u128,
}

/// Fixed-point `a * b / d`, truncating.
///
/// Fails with `Overflow` when `a * b` does not fit (checked as
/// `b != 0 && a > MAX / b`) and `DivByZero` when `d == 0`.
#[inline]
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128> {
    if b != 0 && a > u128::MAX / b {
        return Err(AmmError::Overflow);
    }
    if d == 0 {
        return Err(AmmError::DivByZero);
    }
    Ok(a * b / d)
}

/// Execute one leg of a swap against `(reserve_in, reserve_out)`.
///
/// ```text
/// numerator   = floor(reserve_out * x / wad)
/// denominator = reserve_in + x
/// amount_out  = floor(numerator * wad / denominator)
/// ```
///
/// The two `mul_div` steps truncate twice; callers rely on that exact
/// rounding, so do not fold this into a single division.
///
/// A zero input is a no-op leg.
pub fn swap_leg(reserve_in: u128, reserve_out: u128, amount_in: u128, wad: u128) -> Result<LegResult> {
    if amount_in == 0 {
        return Ok(LegResult {
            amount_out: 0,
            reserve_in,
            reserve_out,
        });
    }

    let numerator = mul_div(reserve_out, amount_in, wad)?;
    let denominator = reserve_in.checked_add(amount_in).ok_or(AmmError::Overflow)?;
    let amount_out = mul_div(numerator, wad, denominator)?;

    let new_in = reserve_in.checked_add(amount_in).ok_or(AmmError::Overflow)?;
    let new_out = reserve_out.checked_sub(amount_out).ok_or(AmmError::Underflow)?;

    Ok(LegResult {
        amount_out,
        reserve_in: new_in,
        reserve_out: new_out,
    })
}

/// Spot price of A in units of B: `floor(reserve_a * wad / reserve_b)`
#[inline]
pub fn spot_price(reserve_a: u128, reserve_b: u128, wad: u128) -> Result<u128> {
    mul_div(reserve_a, wad, reserve_b)
}

/// Babylonian integer square root.
///
/// Inputs below 3 are returned unchanged, so `sqrt(2) == 2`. LP share
/// issuance depends on this low-value behavior.
pub fn sqrt(y: u128) -> u128 {
    if y < 3 {
        return y;
    }
    let mut z = y;
    let mut x = y / 2 + 1;
    while x < z {
        z = x;
        x = (y / x + x) / 2;
    }
    z
}

/// LP shares minted for a deposit of `(amount_a, amount_b)`.
///
/// An empty pool (`total_supply == 0`) issues `sqrt(amount_a * amount_b)`.
/// Otherwise the deposit must match the pool ratio exactly
/// (`reserve_a * amount_b == reserve_b * amount_a`) and issues
/// `min(amount_a * supply / reserve_a, amount_b * supply / reserve_b)`.
pub fn mint_shares(
    amount_a: u128,
    amount_b: u128,
    reserve_a: u128,
    reserve_b: u128,
    total_supply: u128,
) -> Result<u128> {
    if total_supply == 0 {
        let product = amount_a.checked_mul(amount_b).ok_or(AmmError::Overflow)?;
        return Ok(sqrt(product));
    }

    let lhs = reserve_a.checked_mul(amount_b).ok_or(AmmError::Overflow)?;
    let rhs = reserve_b.checked_mul(amount_a).ok_or(AmmError::Overflow)?;
    if lhs != rhs {
        return Err(AmmError::RatioMismatch);
    }

    let by_a = mul_div(amount_a, total_supply, reserve_a)?;
    let by_b = mul_div(amount_b, total_supply, reserve_b)?;
    Ok(by_a.min(by_b))
}

/// Reserve amounts released by burning `shares`: `(shares * reserve_a / supply, shares * reserve_b / supply)`
pub fn burn_shares(
    shares: u128,
    reserve_a: u128,
    reserve_b: u128,
    total_supply: u128,
) -> Result<(u128, u128)> {
    let out_a = mul_div(shares, reserve_a, total_supply)?;
    let out_b = mul_div(shares, reserve_b, total_supply)?;
    Ok((out_a, out_b))
}

/// Approximate output quote: `reserve_out / (reserve_in / x + 1)`.
///
/// Integer division of the reserve ratio makes this lossy and it does not
/// agree with `swap_leg`. Kept in this form on purpose.
pub fn calc_swap_output(reserve_in: u128, reserve_out: u128, x: u128) -> Result<u128> {
    if x == 0 {
        return Err(AmmError::DivByZero);
    }
    let divisor = (reserve_in / x).checked_add(1).ok_or(AmmError::Overflow)?;
    Ok(reserve_out / divisor)
}

/// Approximate input quote: `reserve_in / (reserve_out / y - 1)`.
///
/// Same caveat as [`calc_swap_output`]. Fails with `Underflow` when
/// `reserve_out / y == 0` and `DivByZero` when it equals 1.
pub fn calc_swap_input(reserve_in: u128, reserve_out: u128, y: u128) -> Result<u128> {
    if y == 0 {
        return Err(AmmError::DivByZero);
    }
    let divisor = (reserve_out / y).checked_sub(1).ok_or(AmmError::Underflow)?;
    if divisor == 0 {
        return Err(AmmError::DivByZero);
    }
    Ok(reserve_in / divisor)
}
