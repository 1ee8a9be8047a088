use alloy::primitives::U256;
use std::fmt;

/// Errors from the fixed-point math module. Callers map these into
/// `LedgerError::Validation` — a math error here always means malformed input
/// (an amount or price outside the range the AMM can represent), never a
/// transient condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    DivisionByZero,
    Overflow,
    TickOutOfRange,
    SqrtRatioOutOfRange,
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathError::DivisionByZero => write!(f, "division by zero"),
            MathError::Overflow => write!(f, "result does not fit in 256 bits"),
            MathError::TickOutOfRange => write!(f, "tick out of range"),
            MathError::SqrtRatioOutOfRange => write!(f, "sqrt ratio out of range"),
        }
    }
}

impl std::error::Error for MathError {}

/// `floor(a * b / denominator)`, exact even when `a * b` overflows 256 bits.
///
/// A straight port of the reference AMM's `FullMath.mulDiv`, rebuilt around
/// `U256::widening_mul`/`mul_mod` instead of the Solidity original's inline
/// assembly `mulmod(a, b, not(0))` trick: `widening_mul` already hands back the
/// exact low/high halves of the 512-bit product, so no wider intermediate type
/// is needed.
pub fn mul_div_floor(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }

    let (prod0, prod1) = a.widening_mul(b);

    if prod1.is_zero() {
        return Ok(prod0 / denominator);
    }

    if denominator <= prod1 {
        return Err(MathError::Overflow);
    }

    let remainder = a.mul_mod(b, denominator);
    let mut prod1 = prod1;
    let mut prod0 = prod0;
    if remainder > prod0 {
        prod1 -= U256::from(1u8);
    }
    prod0 = prod0.wrapping_sub(remainder);

    // Factor powers of two out of the denominator.
    let twos = denominator & denominator.wrapping_neg();
    let denominator = denominator / twos;
    let prod0_shifted = prod0 / twos;
    let twos = (U256::ZERO.wrapping_sub(twos)) / twos + U256::from(1u8);
    let prod0 = prod0_shifted | (prod1 * twos);

    // Newton-Raphson to find the modular inverse of `denominator` mod 2^256.
    let mut inverse = (denominator * U256::from(3u8)) ^ U256::from(2u8);
    for _ in 0..6 {
        inverse = inverse * (U256::from(2u8) - denominator * inverse);
    }

    Ok(prod0 * inverse)
}

/// `ceil(a * b / denominator)`.
pub fn mul_div_ceil(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    let result = mul_div_floor(a, b, denominator)?;
    if a.mul_mod(b, denominator) > U256::ZERO {
        result.checked_add(U256::from(1u8)).ok_or(MathError::Overflow)
    } else {
        Ok(result)
    }
}

/// `floor(a * b / denominator)` or `ceil`, selected by `round_up`. Convenience
/// wrapper used throughout `liquidity_amounts` where the rounding direction is
/// a parameter rather than baked into the call site.
pub fn mul_div(a: U256, b: U256, denominator: U256, round_up: bool) -> Result<U256, MathError> {
    if round_up {
        mul_div_ceil(a, b, denominator)
    } else {
        mul_div_floor(a, b, denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_matches_plain_division_when_no_overflow() {
        let a = U256::from(1_000_000_u64);
        let b = U256::from(3_u64);
        let d = U256::from(7_u64);
        assert_eq!(mul_div_floor(a, b, d).unwrap(), (a * b) / d);
    }

    #[test]
    fn ceil_rounds_up_on_remainder() {
        let a = U256::from(7_u64);
        let b = U256::from(3_u64);
        let d = U256::from(2_u64);
        // 21 / 2 = 10 remainder 1
        assert_eq!(mul_div_floor(a, b, d).unwrap(), U256::from(10_u64));
        assert_eq!(mul_div_ceil(a, b, d).unwrap(), U256::from(11_u64));
    }

    #[test]
    fn ceil_exact_division_does_not_round_up() {
        let a = U256::from(10_u64);
        let b = U256::from(10_u64);
        let d = U256::from(5_u64);
        assert_eq!(mul_div_ceil(a, b, d).unwrap(), U256::from(20_u64));
    }

    #[test]
    fn handles_a_times_b_overflowing_256_bits() {
        let a = U256::MAX;
        let b = U256::from(2_u64);
        let d = U256::from(2_u64);
        // a*b overflows 256 bits but dividing by 2 brings it back in range.
        assert_eq!(mul_div_floor(a, b, d).unwrap(), a);
    }

    #[test]
    fn division_by_zero_is_rejected() {
        assert_eq!(
            mul_div_floor(U256::from(1_u64), U256::from(1_u64), U256::ZERO),
            Err(MathError::DivisionByZero)
        );
    }
}
