use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One sampled point of the PnL-vs-price curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Sampled quote price, as a decimal string (arbitrary precision, not
    /// rounded to a token's native decimals).
    pub price: String,
    pub tick: i32,
    pub amount0: String,
    pub amount1: String,
    pub value: String,
    pub pnl: String,
}

/// Cached discrete PnL-vs-price curve for a position. Stored as an opaque
/// serialized blob keyed by position, versioned with `calc_version` to force
/// re-generation across code changes, rather than one row per point: the
/// points are always read and regenerated together, never queried individually.
#[derive(Debug, Clone)]
pub struct PositionCurve {
    pub position_id: Uuid,
    pub points: Vec<CurvePoint>,
    pub pool_tick: i32,
    pub pool_sqrt_price_x96: String,
    pub pnl_cache_version: i32,
    pub is_valid: bool,
    pub computed_at: DateTime<Utc>,
}
