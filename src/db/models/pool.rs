use chrono::{DateTime, Utc};

/// Liquidity pool metadata and last-refreshed mutable state.
///
/// Primary key: `(chain, address)`. `fee` and `tick_spacing` are immutable once a
/// pool is first seen; `current_tick`/`current_sqrt_price`/`fee_growth_global_*`
/// are refreshed from chain on demand by whatever component last read `slot0`
/// (the Pool Price Cache for historical blocks, the PnL Aggregator for the
/// current block) and are therefore best-effort, not authoritative history —
/// the authoritative historical price for any given block lives in
/// `pool_price_cache`, never here.
#[derive(Debug, Clone)]
pub struct Pool {
    pub chain: String,
    pub address: String,
    pub protocol: String,
    pub fee: i32,
    pub tick_spacing: i32,
    pub token0: String,
    pub token1: String,
    pub current_tick: Option<i32>,
    /// u160, stored as a decimal string.
    pub current_sqrt_price_x96: Option<String>,
    /// u256, stored as a decimal string.
    pub fee_growth_global_0: Option<String>,
    pub fee_growth_global_1: Option<String>,
    pub updated_at: DateTime<Utc>,
}
