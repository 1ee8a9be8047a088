use chrono::{DateTime, Utc};
use uuid::Uuid;

/// How a `Position` entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportType {
    Nft,
    Discovery,
    Manual,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Nft => "nft",
            ImportType::Discovery => "discovery",
            ImportType::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nft" => Some(ImportType::Nft),
            "discovery" => Some(ImportType::Discovery),
            "manual" => Some(ImportType::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Active,
    Closed,
    Archived,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::Closed => "closed",
            PositionStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PositionStatus::Active),
            "closed" => Some(PositionStatus::Closed),
            "archived" => Some(PositionStatus::Archived),
            _ => None,
        }
    }
}

/// Concentrated-liquidity position identity row.
///
/// Composite business key is `(user_id, chain, protocol, nft_id)`, enforced by a
/// unique constraint in `schema/postgres.sql`; `id` is the surrogate key every
/// other table references. `token0_is_quote` is frozen at creation and is
/// never recomputed by anything in `ledger/` or `pnl/`.
#[derive(Debug, Clone)]
pub struct Position {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chain: String,
    pub protocol: String,
    pub nft_id: String,
    pub pool_chain: String,
    pub pool_address: String,
    pub tick_lower: i32,
    pub tick_upper: i32,
    /// u128, stored as a decimal string.
    pub liquidity: String,
    pub token0_is_quote: bool,
    pub owner: String,
    pub import_type: ImportType,
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
