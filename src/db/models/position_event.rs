use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Where a ledger row originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Onchain,
    Manual,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Onchain => "onchain",
            EventSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "onchain" => Some(EventSource::Onchain),
            "manual" => Some(EventSource::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    IncreaseLiquidity,
    DecreaseLiquidity,
    Collect,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::IncreaseLiquidity => "INCREASE_LIQUIDITY",
            EventType::DecreaseLiquidity => "DECREASE_LIQUIDITY",
            EventType::Collect => "COLLECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INCREASE_LIQUIDITY" => Some(EventType::IncreaseLiquidity),
            "DECREASE_LIQUIDITY" => Some(EventType::DecreaseLiquidity),
            "COLLECT" => Some(EventType::Collect),
            _ => None,
        }
    }
}

/// One row of a position's ledger.
///
/// Ordered by `(block_number, transaction_index, log_index)`; manual rows carry
/// `transaction_index = -1` and a dense run of negative `log_index` values so
/// they always sort before any on-chain row at the same block (invariant 6).
/// Every 256-bit quantity is stored as a decimal string rather than a native
/// numeric column — Postgres has no native `u256`/`i256`, and round-tripping
/// through `NUMERIC` would invite silent precision loss the ledger cannot
/// tolerate.
#[derive(Debug, Clone)]
pub struct PositionEvent {
    pub id: Uuid,
    pub position_id: Uuid,
    pub source: EventSource,
    pub ledger_ignore: bool,
    pub event_type: EventType,
    pub block_number: i64,
    pub transaction_index: i32,
    pub log_index: i32,
    pub block_timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    /// i128, signed: positive for INCREASE, negative for DECREASE, zero for COLLECT.
    pub delta_l: String,
    pub token0_amount: String,
    pub token1_amount: String,
    pub pool_sqrt_price_x96: String,
    pub liquidity_after: String,
    pub cost_basis_after: String,
    pub realized_pnl_after: String,
    pub uncollected_principal_0: String,
    pub uncollected_principal_1: String,
    pub delta_cost_basis: String,
    pub delta_pnl: String,
    pub fee_value_in_quote: String,
    pub token_value_in_quote: String,
    pub input_hash: String,
    pub calc_version: i32,
}
