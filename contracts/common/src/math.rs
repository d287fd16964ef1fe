//! Mathematical Utilities for POSUM Pools
//!
//! Exact integer arithmetic for share/asset conversion and time-prorated
//! accrual. All division floors, so rounding always favours the pool.

use crate::constants::scale;
use crate::errors::{PosumError, PosumResult};

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two u128 values, returned as (high, low) limbs
pub fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_MASK);
    let (b1, b0) = (b >> 64, b & LOW_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // At most 3 * (2^64 - 1), no overflow
    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
    let lo = (p00 & LOW_MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// Divide the 256-bit value `hi:lo` by `d`. Requires `hi < d`.
fn div_wide(hi: u128, lo: u128, d: u128) -> u128 {
    let mut rem = hi;
    let mut quotient = 0u128;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    quotient
}

/// Calculate `a * b / denom` with a 256-bit intermediate, rounding down.
///
/// # Errors
/// * `DivisionByZero` when `denom == 0`
/// * `ArithmeticOverflow` when the quotient does not fit in u128
pub fn mul_div(a: u128, b: u128, denom: u128) -> PosumResult<u128> {
    if denom == 0 {
        return Err(PosumError::DivisionByZero);
    }
    let (hi, lo) = mul_wide(a, b);
    if hi == 0 {
        return Ok(lo / denom);
    }
    if hi >= denom {
        return Err(PosumError::ArithmeticOverflow);
    }
    Ok(div_wide(hi, lo, denom))
}

/// Amount accrued at `rate` per second over `seconds`
pub fn pro_rate(rate: u128, seconds: u64) -> PosumResult<u128> {
    rate.checked_mul(seconds as u128)
        .ok_or(PosumError::ArithmeticOverflow)
}

/// Scale `amount` by a basis-point factor (10000 = 1x)
pub fn apply_bps(amount: u128, bps: u32) -> PosumResult<u128> {
    mul_div(amount, bps as u128, scale::BPS_DENOMINATOR)
}

/// Asset value of `shares` at the given totals; 0 for an empty vault
pub fn assets_for_shares(
    shares: u128,
    total_assets: u128,
    total_shares: u128,
) -> PosumResult<u128> {
    if total_shares == 0 {
        return Ok(0);
    }
    mul_div(shares, total_assets, total_shares)
}

/// Shares minted for `assets`; 1:1 whenever no shares exist
pub fn shares_for_assets(
    assets: u128,
    total_assets: u128,
    total_shares: u128,
) -> PosumResult<u128> {
    if total_shares == 0 {
        return Ok(assets);
    }
    if total_assets == 0 {
        return Err(PosumError::InvariantViolated {
            reason: "shares outstanding against zero assets",
        });
    }
    mul_div(assets, total_shares, total_assets)
}

/// Value accrued by `balance` as an accumulator moved from `checkpoint` to
/// `current`, both fixed point at the pool's `scale`
pub fn accrued_between(
    balance: u128,
    current: u128,
    checkpoint: u128,
    scale: u128,
) -> PosumResult<u128> {
    let delta = current
        .checked_sub(checkpoint)
        .ok_or(PosumError::InvariantViolated { reason: "accumulator moved backwards" })?;
    mul_div(balance, delta, scale)
}

/// Safe addition with overflow check
pub fn checked_add(a: u128, b: u128) -> PosumResult<u128> {
    a.checked_add(b).ok_or(PosumError::ArithmeticOverflow)
}

/// Safe subtraction; underflow is a bookkeeping bug
pub fn checked_sub(a: u128, b: u128) -> PosumResult<u128> {
    a.checked_sub(b)
        .ok_or(PosumError::InvariantViolated { reason: "ledger subtraction underflow" })
}
