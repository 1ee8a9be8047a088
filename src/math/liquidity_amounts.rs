//! Liquidity <-> token amount conversions, grounded on the same formulas
//! `shuhuiluo-uniswap-v3-sdk-rs` exposes in its `liquidity_amounts` module,
//! re-expressed against this crate's own `mul_div`/`mul_div_ceil`.

use super::full_math::{mul_div, mul_div_ceil, mul_div_floor, MathError};
use alloy::primitives::U256;

const Q96: u8 = 96;

fn sorted(sqrt_a: U256, sqrt_b: U256) -> (U256, U256) {
    if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    }
}

/// Token0 owed for `liquidity` spread between `sqrt_ratio_ax96` and
/// `sqrt_ratio_bx96`. `round_up` should be `true` when computing how much a
/// depositor must put up and `false` when computing how much a withdrawer
/// receives, per the ledger's floor-on-withdrawal convention.
pub fn get_amount0_delta(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_ax96, sqrt_ratio_bx96);
    if sqrt_a.is_zero() {
        return Err(MathError::SqrtRatioOutOfRange);
    }
    let numerator1 = U256::from(liquidity) << Q96;
    let numerator2 = sqrt_b - sqrt_a;

    if round_up {
        let inner = mul_div_ceil(numerator1, numerator2, sqrt_b)?;
        mul_div_ceil(inner, U256::from(1u8), sqrt_a)
    } else {
        let inner = mul_div_floor(numerator1, numerator2, sqrt_b)?;
        Ok(inner / sqrt_a)
    }
}

/// Token1 owed for `liquidity` spread between `sqrt_ratio_ax96` and
/// `sqrt_ratio_bx96`.
pub fn get_amount1_delta(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_ax96, sqrt_ratio_bx96);
    let numerator = sqrt_b - sqrt_a;
    mul_div(U256::from(liquidity), numerator, U256::from(1u8) << Q96, round_up)
}

/// Splits `liquidity` into `(amount0, amount1)` given the pool's current tick
/// sqrt-ratio and the position's tick range, across three regimes:
/// entirely below range (all token0), entirely above range (all token1), or
/// straddling the current price (a mix of both). Amounts are floored, since
/// this function always represents a withdrawal quantity (what the position
/// actually holds), never a deposit requirement.
pub fn amounts_from_liquidity(
    liquidity: u128,
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_lower_x96: U256,
    sqrt_ratio_upper_x96: U256,
) -> Result<(U256, U256), MathError> {
    let (sqrt_lower, sqrt_upper) = sorted(sqrt_ratio_lower_x96, sqrt_ratio_upper_x96);

    if sqrt_ratio_current_x96 <= sqrt_lower {
        let amount0 = get_amount0_delta(sqrt_lower, sqrt_upper, liquidity, false)?;
        Ok((amount0, U256::ZERO))
    } else if sqrt_ratio_current_x96 >= sqrt_upper {
        let amount1 = get_amount1_delta(sqrt_lower, sqrt_upper, liquidity, false)?;
        Ok((U256::ZERO, amount1))
    } else {
        let amount0 = get_amount0_delta(sqrt_ratio_current_x96, sqrt_upper, liquidity, false)?;
        let amount1 = get_amount1_delta(sqrt_lower, sqrt_ratio_current_x96, liquidity, false)?;
        Ok((amount0, amount1))
    }
}

/// Liquidity that `amount0` of token0 buys between two sqrt ratios. `round_up`
/// is `false` for the read-only valuation uses in this crate (there is no
/// minting path here), but is exposed per §4.F so the signature matches the
/// reference AMM's own `round_up`-parameterized form.
pub fn liquidity_from_amount0(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    amount0: U256,
    round_up: bool,
) -> Result<u128, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_ax96, sqrt_ratio_bx96);
    let intermediate = mul_div(sqrt_a, sqrt_b, U256::from(1u8) << Q96, round_up)?;
    let liquidity = mul_div(amount0, intermediate, sqrt_b - sqrt_a, round_up)?;
    u256_to_u128(liquidity)
}

/// Liquidity that `amount1` of token1 buys between two sqrt ratios.
pub fn liquidity_from_amount1(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    amount1: U256,
    round_up: bool,
) -> Result<u128, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_ax96, sqrt_ratio_bx96);
    let liquidity = mul_div(amount1, U256::from(1u8) << Q96, sqrt_b - sqrt_a, round_up)?;
    u256_to_u128(liquidity)
}

fn u256_to_u128(value: U256) -> Result<u128, MathError> {
    u128::try_from(value).map_err(|_| MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::get_sqrt_ratio_at_tick;

    #[test]
    fn below_range_position_holds_only_token0() {
        let sqrt_current = get_sqrt_ratio_at_tick(-1000).unwrap();
        let sqrt_lower = get_sqrt_ratio_at_tick(0).unwrap();
        let sqrt_upper = get_sqrt_ratio_at_tick(1000).unwrap();
        let (amount0, amount1) =
            amounts_from_liquidity(1_000_000_000, sqrt_current, sqrt_lower, sqrt_upper).unwrap();
        assert!(amount0 > U256::ZERO);
        assert_eq!(amount1, U256::ZERO);
    }

    #[test]
    fn above_range_position_holds_only_token1() {
        let sqrt_current = get_sqrt_ratio_at_tick(2000).unwrap();
        let sqrt_lower = get_sqrt_ratio_at_tick(0).unwrap();
        let sqrt_upper = get_sqrt_ratio_at_tick(1000).unwrap();
        let (amount0, amount1) =
            amounts_from_liquidity(1_000_000_000, sqrt_current, sqrt_lower, sqrt_upper).unwrap();
        assert_eq!(amount0, U256::ZERO);
        assert!(amount1 > U256::ZERO);
    }

    #[test]
    fn in_range_position_holds_both_tokens() {
        let sqrt_current = get_sqrt_ratio_at_tick(500).unwrap();
        let sqrt_lower = get_sqrt_ratio_at_tick(0).unwrap();
        let sqrt_upper = get_sqrt_ratio_at_tick(1000).unwrap();
        let (amount0, amount1) =
            amounts_from_liquidity(1_000_000_000, sqrt_current, sqrt_lower, sqrt_upper).unwrap();
        assert!(amount0 > U256::ZERO);
        assert!(amount1 > U256::ZERO);
    }

    #[test]
    fn liquidity_amount_round_trip_is_approximately_stable() {
        let sqrt_lower = get_sqrt_ratio_at_tick(0).unwrap();
        let sqrt_upper = get_sqrt_ratio_at_tick(1000).unwrap();
        let liquidity = 1_000_000_000_000_u128;
        let amount0 = get_amount0_delta(sqrt_lower, sqrt_upper, liquidity, false).unwrap();
        let recovered = liquidity_from_amount0(sqrt_lower, sqrt_upper, amount0, false).unwrap();
        assert!(recovered <= liquidity);
        assert!(recovered + 10 >= liquidity);
    }
}
