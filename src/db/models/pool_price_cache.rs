use chrono::{DateTime, Utc};

/// A memoized `slot0` read. Keyed by `(chain, pool_address, block_number)`.
///
/// Entries at final blocks never change once written — `slot0` for a finalized
/// block is a historical fact — so the durable layer never updates a row after
/// insert; it only ever upserts the same value again, which the unique
/// constraint on the key makes a no-op in practice.
#[derive(Debug, Clone)]
pub struct PoolPriceCacheEntry {
    pub chain: String,
    pub pool_address: String,
    pub block_number: i64,
    pub sqrt_price_x96: String,
    pub tick: i32,
    pub block_timestamp: DateTime<Utc>,
}
