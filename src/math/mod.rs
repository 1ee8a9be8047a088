//! Exact-integer fixed-point math for Q64.96 sqrt-prices, ticks, and liquidity.
//!
//! Every public function here operates on `alloy_primitives::U256`/`I256` only.
//! No floating point and no arbitrary-precision decimal library is used anywhere
//! in this module.

mod full_math;
mod liquidity_amounts;
mod price;
mod tick_math;

pub use full_math::{mul_div_ceil, mul_div_floor, MathError};
pub use liquidity_amounts::{
    amounts_from_liquidity, liquidity_from_amount0, liquidity_from_amount1,
};
pub use price::{sqrt_ratio_to_price_0_per_1, sqrt_ratio_to_price_1_per_0};
pub use tick_math::{get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, MAX_TICK, MIN_TICK};
