//! Curve Cache: a discrete PnL-vs-price curve per position, regenerated
//! whenever the PnL Aggregator's output changes or the pool's price crosses
//! out of the cached curve's validity window. Pure computation over already
//! fetched pool/position state; the only I/O is the final upsert, mirroring
//! `pnl::PnlAggregator`'s shape.

use alloy::primitives::U256;
use anyhow::Result;
use chrono::Utc;

use crate::db::models::{CurvePoint, PositionCurve};
use crate::db::postgres::PostgresClient;
use crate::math::{amounts_from_liquidity, get_sqrt_ratio_at_tick};

use crate::ledger::valuation::token_value_in_quote;

/// Number of sampled points across the curve.
pub const CURVE_POINTS: usize = 25;

/// `round(ln(1.2) / ln(1.0001))`: the tick-space equivalent of expanding a
/// price range by a factor of 1.2 in either direction, since
/// `price(tick) = 1.0001^tick`.
const RANGE_EXPANSION_TICKS: i32 = 1823;

pub const CURVE_CALC_VERSION: i32 = 1;

pub struct CurveGenerator {
    postgres: std::sync::Arc<PostgresClient>,
}

impl CurveGenerator {
    pub fn new(postgres: std::sync::Arc<PostgresClient>) -> Self {
        Self { postgres }
    }

    /// Regenerates and persists the curve for one position. `liquidity`
    /// and `cost_basis_after` come from the ledger tail (the same row the PnL
    /// Aggregator reads); `pool_tick`/`pool_sqrt_price_x96` are the pool's
    /// current state, carried on the row as the invalidation version token.
    #[allow(clippy::too_many_arguments)]
    pub async fn regenerate(
        &self,
        position_id: uuid::Uuid,
        liquidity: u128,
        tick_lower: i32,
        tick_upper: i32,
        tick_spacing: i32,
        cost_basis_after: alloy::primitives::I256,
        token0_is_quote: bool,
        token0_decimals: u8,
        token1_decimals: u8,
        pool_tick: i32,
        pool_sqrt_price_x96: U256,
    ) -> Result<PositionCurve> {
        let points = generate_points(
            liquidity,
            tick_lower,
            tick_upper,
            tick_spacing,
            cost_basis_after,
            token0_is_quote,
            token0_decimals,
            token1_decimals,
        )?;

        let curve = PositionCurve {
            position_id,
            points,
            pool_tick,
            pool_sqrt_price_x96: pool_sqrt_price_x96.to_string(),
            pnl_cache_version: CURVE_CALC_VERSION,
            is_valid: true,
            computed_at: Utc::now(),
        };

        self.postgres.upsert_position_curve(&curve).await?;
        Ok(curve)
    }

    /// Marks the cached curve stale without recomputing it. The next read
    /// triggers `regenerate`.
    pub async fn invalidate(&self, position_id: uuid::Uuid) -> Result<()> {
        self.postgres.invalidate_position_curve(position_id).await
    }
}

/// Pure sampling step, factored out of `regenerate` so it's exercisable
/// without a database.
#[allow(clippy::too_many_arguments)]
fn generate_points(
    liquidity: u128,
    tick_lower: i32,
    tick_upper: i32,
    tick_spacing: i32,
    cost_basis_after: alloy::primitives::I256,
    token0_is_quote: bool,
    token0_decimals: u8,
    token1_decimals: u8,
) -> Result<Vec<CurvePoint>> {
    let low = tick_lower - RANGE_EXPANSION_TICKS;
    let high = tick_upper + RANGE_EXPANSION_TICKS;
    let span = (high - low) as f64;

    let mut points = Vec::with_capacity(CURVE_POINTS);
    for i in 0..CURVE_POINTS {
        let fraction = i as f64 / (CURVE_POINTS - 1) as f64;
        let raw_tick = low as f64 + fraction * span;
        let tick = snap_to_spacing(raw_tick.round() as i32, tick_spacing);

        let sqrt_price = get_sqrt_ratio_at_tick(tick)?;
        let (amount0, amount1) = amounts_from_liquidity(
            liquidity,
            sqrt_price,
            get_sqrt_ratio_at_tick(tick_lower)?,
            get_sqrt_ratio_at_tick(tick_upper)?,
        )
        .map_err(|e| anyhow::anyhow!("computing curve amounts at tick {tick}: {e}"))?;

        let value = token_value_in_quote(
            amount0,
            amount1,
            sqrt_price,
            token0_decimals,
            token1_decimals,
            token0_is_quote,
        )
        .map_err(|e| anyhow::anyhow!("valuing curve point at tick {tick}: {e}"))?;

        let pnl = value - cost_basis_after;

        let price = if token0_is_quote {
            crate::math::sqrt_ratio_to_price_0_per_1(sqrt_price, token1_decimals)
        } else {
            crate::math::sqrt_ratio_to_price_1_per_0(sqrt_price, token0_decimals)
        }
        .map_err(|e| anyhow::anyhow!("pricing curve point at tick {tick}: {e}"))?;

        points.push(CurvePoint {
            price: price.to_string(),
            tick,
            amount0: amount0.to_string(),
            amount1: amount1.to_string(),
            value: value.to_string(),
            pnl: pnl.to_string(),
        });
    }

    Ok(points)
}

fn snap_to_spacing(tick: i32, spacing: i32) -> i32 {
    if spacing <= 1 {
        return tick;
    }
    let rem = tick.rem_euclid(spacing);
    if rem * 2 >= spacing {
        tick - rem + spacing
    } else {
        tick - rem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::I256;

    #[test]
    fn snap_rounds_to_nearest_spacing_multiple() {
        assert_eq!(snap_to_spacing(0, 60), 0);
        assert_eq!(snap_to_spacing(29, 60), 0);
        assert_eq!(snap_to_spacing(31, 60), 60);
        assert_eq!(snap_to_spacing(-31, 60), -60);
    }

    #[test]
    fn generates_requested_point_count_spanning_outward_from_range() {
        let points =
            generate_points(1_000_000_000_000u128, -6000, 6000, 60, I256::ZERO, true, 18, 18)
                .unwrap();
        assert_eq!(points.len(), CURVE_POINTS);
        assert!(points[0].tick < -6000);
        assert!(points[CURVE_POINTS - 1].tick > 6000);
        for w in points.windows(2) {
            assert!(w[1].tick >= w[0].tick);
        }
    }

    #[test]
    fn pnl_is_negative_cost_basis_at_zero_liquidity() {
        let cost_basis = I256::try_from(500i64).unwrap();
        let points = generate_points(0, -1000, 1000, 60, cost_basis, true, 18, 18).unwrap();
        for p in points {
            assert_eq!(p.value, "0");
            assert_eq!(p.pnl, (-cost_basis).to_string());
        }
    }
}
