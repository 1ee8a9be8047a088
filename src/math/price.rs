use super::full_math::{mul_div_floor, MathError};
use alloy::primitives::U256;

/// token1-per-token0 price, scaled to `10^decimals0` base units, computed as
/// `(sqrt_x96^2 * 10^decimals0) / 2^192`.
///
/// `sqrt_x96` can be large enough that squaring it directly overflows 256
/// bits (it approaches `MAX_SQRT_RATIO`, itself close to `2^160`), so the
/// squaring and the division by `2^192` are never split into separate steps —
/// `mul_div_floor` folds both into the widened 512-bit intermediate.
pub fn sqrt_ratio_to_price_1_per_0(sqrt_x96: U256, decimals0: u8) -> Result<U256, MathError> {
    let scale = U256::from(10u8).pow(U256::from(decimals0));
    let scaled_sqrt = sqrt_x96.checked_mul(scale).ok_or(MathError::Overflow)?;
    mul_div_floor(sqrt_x96, scaled_sqrt, U256::from(1u8) << 192)
}

/// token0-per-token1 price, scaled to `10^decimals1` base units: the
/// reciprocal framing, `(2^192 * 10^decimals1) / sqrt_x96^2`.
///
/// Computed as two successive floor-divisions by `sqrt_x96` rather than one
/// division by `sqrt_x96^2`, since `floor(floor(a / b) / b) == floor(a / b^2)`
/// for positive integers — this sidesteps ever materializing `sqrt_x96^2`,
/// which would itself overflow 256 bits near the top of the tick range.
pub fn sqrt_ratio_to_price_0_per_1(sqrt_x96: U256, decimals1: u8) -> Result<U256, MathError> {
    if sqrt_x96.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let scale = U256::from(10u8).pow(U256::from(decimals1));
    let step = mul_div_floor(U256::from(1u8) << 192, scale, sqrt_x96)?;
    Ok(step / sqrt_x96)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::get_sqrt_ratio_at_tick;

    #[test]
    fn price_at_tick_zero_is_one_to_one_when_decimals_match() {
        let sqrt_x96 = get_sqrt_ratio_at_tick(0).unwrap();
        let price = sqrt_ratio_to_price_1_per_0(sqrt_x96, 18).unwrap();
        // At tick 0 the raw ratio is 1; scaled by 10^18 it should equal 10^18
        // within integer rounding of the squaring step.
        let expected = U256::from(10u8).pow(U256::from(18u8));
        let diff = if price > expected {
            price - expected
        } else {
            expected - price
        };
        assert!(diff < U256::from(1_000_000u64));
    }

    #[test]
    fn price_increases_with_tick() {
        let s_low = get_sqrt_ratio_at_tick(0).unwrap();
        let s_high = get_sqrt_ratio_at_tick(1000).unwrap();
        let p_low = sqrt_ratio_to_price_1_per_0(s_low, 18).unwrap();
        let p_high = sqrt_ratio_to_price_1_per_0(s_high, 18).unwrap();
        assert!(p_high > p_low);
    }

    #[test]
    fn price_0_per_1_is_reciprocal_framing_at_tick_zero() {
        let sqrt_x96 = get_sqrt_ratio_at_tick(0).unwrap();
        let p01 = sqrt_ratio_to_price_0_per_1(sqrt_x96, 18).unwrap();
        let expected = U256::from(10u8).pow(U256::from(18u8));
        let diff = if p01 > expected {
            p01 - expected
        } else {
            expected - p01
        };
        assert!(diff < U256::from(1_000_000u64));
    }

    #[test]
    fn price_near_max_tick_does_not_overflow() {
        let sqrt_x96 = get_sqrt_ratio_at_tick(crate::math::MAX_TICK - 1).unwrap();
        assert!(sqrt_ratio_to_price_1_per_0(sqrt_x96, 18).is_ok());
        assert!(sqrt_ratio_to_price_0_per_1(sqrt_x96, 18).is_ok());
    }
}
