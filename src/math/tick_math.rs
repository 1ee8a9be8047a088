//! Tick <-> sqrt-ratio conversion, ported from the reference AMM's `TickMath.sol`
//! bit-manipulation algorithm (the same one `shuhuiluo-uniswap-v3-sdk-rs` wraps via
//! the external `uniswap_v3_math` crate). Re-expressed here directly against
//! `alloy_primitives::U256` and this crate's own `MathError` so the whole math
//! module stays in one numeric ecosystem.

use super::full_math::MathError;
use alloy::primitives::U256;
use once_cell::sync::Lazy;
use std::ops::{Shl, Shr, Sub};

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// `get_sqrt_ratio_at_tick(MIN_TICK)`.
pub static MIN_SQRT_RATIO: Lazy<U256> = Lazy::new(|| U256::from(4295128739_u64));
/// `get_sqrt_ratio_at_tick(MAX_TICK)`.
pub static MAX_SQRT_RATIO: Lazy<U256> = Lazy::new(|| {
    hex_const("fffd8963efd1fc6a506488495d951d5263988d26")
});

fn hex_const(s: &str) -> U256 {
    U256::from_str_radix(s, 16).expect("constant literal is valid hex")
}

fn most_significant_bit(x: U256) -> u8 {
    debug_assert!(!x.is_zero());
    (x.bit_len() - 1) as u8
}

/// Returns the sqrt ratio as a Q64.96 for the given tick: `sqrt(1.0001)^tick`.
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Result<U256, MathError> {
    let abs_tick = tick.unsigned_abs();

    if abs_tick > MAX_TICK as u32 {
        return Err(MathError::TickOutOfRange);
    }

    let mut ratio = hex_const("fffcb933bd6fad37aa2d162d1a5940010000000000000000000000000000000")
        .shr((abs_tick & 0x1) << 7)
        & hex_const("1ffffffffffffffffffffffffffffffff");

    if abs_tick & 0x2 != 0 {
        ratio = (ratio * hex_const("fff97272373d413259a46990580e213a")) >> 128;
    }
    if abs_tick & 0x4 != 0 {
        ratio = (ratio * hex_const("fff2e50f5f656932ef12357cf3c7fdcc")) >> 128;
    }
    if abs_tick & 0x8 != 0 {
        ratio = (ratio * hex_const("ffe5caca7e10e4e61c3624eaa0941cd0")) >> 128;
    }
    if abs_tick & 0x10 != 0 {
        ratio = (ratio * hex_const("ffcb9843d60f6159c9db58835c926644")) >> 128;
    }
    if abs_tick & 0x20 != 0 {
        ratio = (ratio * hex_const("ff973b41fa98c081472e6896dfb254c0")) >> 128;
    }
    if abs_tick & 0x40 != 0 {
        ratio = (ratio * hex_const("ff2ea16466c96a3843ec78b326b52861")) >> 128;
    }
    if abs_tick & 0x80 != 0 {
        ratio = (ratio * hex_const("fe5dee046a99a2a811c461f1969c3053")) >> 128;
    }
    if abs_tick & 0x100 != 0 {
        ratio = (ratio * hex_const("fcbe86c7900a88aedcffc83b479aa3a4")) >> 128;
    }
    if abs_tick & 0x200 != 0 {
        ratio = (ratio * hex_const("f987a7253ac413176f2b074cf7815e54")) >> 128;
    }
    if abs_tick & 0x400 != 0 {
        ratio = (ratio * hex_const("f3392b0822b70005940c7a398e4b70f3")) >> 128;
    }
    if abs_tick & 0x800 != 0 {
        ratio = (ratio * hex_const("e7159475a2c29b7443b29c7fa6e889d9")) >> 128;
    }
    if abs_tick & 0x1000 != 0 {
        ratio = (ratio * hex_const("d097f3bdfd2022b8845ad8f792aa5825")) >> 128;
    }
    if abs_tick & 0x2000 != 0 {
        ratio = (ratio * hex_const("a9f746462d870fdf8a65dc1f90e061e5")) >> 128;
    }
    if abs_tick & 0x4000 != 0 {
        ratio = (ratio * hex_const("70d869a156d2a1b890bb3df62baf32f7")) >> 128;
    }
    if abs_tick & 0x8000 != 0 {
        ratio = (ratio * hex_const("31be135f97d08fd981231505542fcfa6")) >> 128;
    }
    if abs_tick & 0x10000 != 0 {
        ratio = (ratio * hex_const("9aa508b5b7a84e1c677de54f3e99bc9")) >> 128;
    }
    if abs_tick & 0x20000 != 0 {
        ratio = (ratio * hex_const("5d6af8dedb81196699c329225ee604")) >> 128;
    }
    if abs_tick & 0x40000 != 0 {
        ratio = (ratio * hex_const("2216e584f5fa1ea926041bedfe98")) >> 128;
    }
    if abs_tick & 0x80000 != 0 {
        ratio = (ratio * hex_const("48a170391f7dc42444e8fa2")) >> 128;
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    Ok((ratio + hex_const("ffffffff")) >> 32)
}

/// Returns the tick such that `get_sqrt_ratio_at_tick(tick) <= sqrt_ratio_x96 <
/// get_sqrt_ratio_at_tick(tick + 1)`.
pub fn get_tick_at_sqrt_ratio(sqrt_ratio_x96: U256) -> Result<i32, MathError> {
    if sqrt_ratio_x96 < *MIN_SQRT_RATIO || sqrt_ratio_x96 >= *MAX_SQRT_RATIO {
        return Err(MathError::SqrtRatioOutOfRange);
    }

    let msb = most_significant_bit(sqrt_ratio_x96);

    let mut log_2_x64: U256 = U256::from_limbs([msb as u64, 0, 0, 0])
        .sub(U256::from(96u8))
        .shl(64u8);

    let mut r: U256 = sqrt_ratio_x96.shl(96u8).shr(msb - 31u8);

    fn to_shift(x: U256) -> u8 {
        x.into_limbs()[0] as u8
    }

    // Fourteen Newton-style refinement steps, each sharpening one more bit of
    // the 64-bit fractional part of log2(sqrt_ratio_x96).
    for shift in (50..=63).rev() {
        let square: U256 = r * r;
        let f: U256 = square >> 255;
        r = square >> (to_shift(f) + 127);
        log_2_x64 |= f << shift;
    }

    let log_sqrt10001: U256 = log_2_x64 * U256::from(255738958999603826347141_u128);
    let tick_low: U256 =
        (log_sqrt10001 - U256::from(3402992956809132418596140100660247210_u128)).shr(128u8);
    let tick_low: i32 = tick_low.into_limbs()[0] as i32;
    let tick_high: U256 =
        (log_sqrt10001 + U256::from(291339464771989622907027621153398088495_u128)).shr(128u8);
    let tick_high: i32 = tick_high.into_limbs()[0] as i32;

    let tick = if tick_low == tick_high {
        tick_low
    } else {
        tick_high - (get_sqrt_ratio_at_tick(tick_high)? > sqrt_ratio_x96) as i32
    };

    Ok(tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_tick_constant() {
        assert_eq!(MIN_TICK, -887272);
    }

    #[test]
    fn max_tick_constant() {
        assert_eq!(MAX_TICK, 887272);
    }

    #[test]
    fn rejects_tick_below_min() {
        assert_eq!(
            get_sqrt_ratio_at_tick(MIN_TICK - 1),
            Err(MathError::TickOutOfRange)
        );
    }

    #[test]
    fn rejects_tick_above_max() {
        assert_eq!(
            get_sqrt_ratio_at_tick(MAX_TICK + 1),
            Err(MathError::TickOutOfRange)
        );
    }

    #[test]
    fn min_tick_matches_min_sqrt_ratio() {
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK).unwrap(), *MIN_SQRT_RATIO);
    }

    #[test]
    fn tick_zero_is_one_shifted_by_96() {
        assert_eq!(get_sqrt_ratio_at_tick(0).unwrap(), U256::from(1u8) << 96);
    }

    #[test]
    fn tick_at_sqrt_ratio_round_trips_at_min() {
        assert_eq!(get_tick_at_sqrt_ratio(*MIN_SQRT_RATIO).unwrap(), MIN_TICK);
    }

    #[test]
    fn tick_at_sqrt_ratio_is_monotonic_near_zero() {
        let s0 = get_sqrt_ratio_at_tick(0).unwrap();
        let s1 = get_sqrt_ratio_at_tick(1).unwrap();
        assert!(s1 > s0);
        assert_eq!(get_tick_at_sqrt_ratio(s0).unwrap(), 0);
    }
}
