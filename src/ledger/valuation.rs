//! Quote-denominated valuation of a pair of raw token amounts, built directly
//! on the already-tested `sqrt_ratio_to_price_*` primitives of
//! `math/price.rs`.

use alloy::primitives::{I256, U256};

use crate::errors::LedgerError;
use crate::math::{mul_div_floor, sqrt_ratio_to_price_0_per_1, sqrt_ratio_to_price_1_per_0, MathError};

fn map_math_err(err: MathError) -> LedgerError {
    LedgerError::Validation(format!("pricing math failed: {err}"))
}

/// Values `(amount0, amount1)`, both in raw token units, in the quote token's
/// raw units, using the pool's `sqrt_price_x96` at the event's block.
///
/// When token0 is quote, token1's amount is converted via the
/// "token0-per-token1" price; when token1 is quote, token0's amount is
/// converted via "token1-per-token0". Either way the quote-side leg passes
/// through unconverted.
pub fn token_value_in_quote(
    amount0: U256,
    amount1: U256,
    sqrt_price_x96: U256,
    decimals0: u8,
    decimals1: u8,
    token0_is_quote: bool,
) -> Result<I256, LedgerError> {
    let total = if token0_is_quote {
        let price = sqrt_ratio_to_price_0_per_1(sqrt_price_x96, decimals1).map_err(map_math_err)?;
        let scale = U256::from(10u8).pow(U256::from(decimals1));
        let amount1_in_token0 = mul_div_floor(amount1, price, scale).map_err(map_math_err)?;
        amount0.checked_add(amount1_in_token0).ok_or_else(|| {
            LedgerError::InvariantViolation("token_value_in_quote overflowed u256".into())
        })?
    } else {
        let price = sqrt_ratio_to_price_1_per_0(sqrt_price_x96, decimals0).map_err(map_math_err)?;
        let scale = U256::from(10u8).pow(U256::from(decimals0));
        let amount0_in_token1 = mul_div_floor(amount0, price, scale).map_err(map_math_err)?;
        amount1.checked_add(amount0_in_token1).ok_or_else(|| {
            LedgerError::InvariantViolation("token_value_in_quote overflowed u256".into())
        })?
    };

    if total.bit_len() >= 255 {
        return Err(LedgerError::InvariantViolation(
            "token_value_in_quote does not fit in a signed 256-bit integer".into(),
        ));
    }
    Ok(I256::from_raw(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::get_sqrt_ratio_at_tick;

    #[test]
    fn equal_decimals_at_tick_zero_sums_amounts_when_token0_is_quote() {
        let sqrt = get_sqrt_ratio_at_tick(0).unwrap();
        let value = token_value_in_quote(U256::from(100u64), U256::from(200u64), sqrt, 18, 18, true)
            .unwrap();
        // At tick 0 the pool price is 1:1, so token1's 200 units convert to
        // ~200 units of token0, for a total close to 300.
        let diff = if value > I256::try_from(300i64).unwrap() {
            value - I256::try_from(300i64).unwrap()
        } else {
            I256::try_from(300i64).unwrap() - value
        };
        assert!(diff < I256::try_from(5i64).unwrap());
    }

    #[test]
    fn zero_amounts_value_to_zero() {
        let sqrt = get_sqrt_ratio_at_tick(1234).unwrap();
        let value = token_value_in_quote(U256::ZERO, U256::ZERO, sqrt, 18, 6, false).unwrap();
        assert_eq!(value, I256::ZERO);
    }
}
