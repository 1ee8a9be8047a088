use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Cached rollup produced by the PnL Aggregator. One row per position; every
/// monetary field is a signed-256-bit decimal string in the position's quote
/// token's base units.
#[derive(Debug, Clone)]
pub struct PositionPnl {
    pub position_id: Uuid,
    pub current_value: String,
    pub current_cost_basis: String,
    pub realized_pnl: String,
    pub collected_fees: String,
    pub unclaimed_fees: String,
    pub unrealized_pnl: String,
    pub total_pnl: String,
    pub calc_version: i32,
    pub computed_at: DateTime<Utc>,
}
