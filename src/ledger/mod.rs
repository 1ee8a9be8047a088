//! Ledger Engine: the only component allowed to write `position_event` rows.
//! `sync` re-derives a position's entire post-boundary ledger inside one
//! Postgres transaction so a crash never leaves a half-written sync visible;
//! `add_manual_event` appends a user-supplied adjustment and then re-runs
//! `sync` so the new row folds into the running state like any other.
//!
//! The single-transaction batch-write pattern follows `db/postgres/ops.rs`
//! (every write function is generic over `tokio_postgres::GenericClient`, so
//! the same function runs against a pooled `Client` or a `Transaction`); the
//! overall "fetch since last boundary, reconcile, persist" shape is the usual
//! checkpoint-loop idiom for an incremental indexer.

pub mod merge;
pub mod state;
pub mod transition;
pub mod valuation;

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use chrono::Utc;
use md5::{Digest, Md5};
use uuid::Uuid;

use crate::block_info::BlockInfoService;
use crate::chain::{BlockTag, ChainClient};
use crate::config::FinalityPolicy;
use crate::db::models::{EventSource, EventType as DbEventType, Position, PositionEvent};
use crate::db::postgres as ops;
use crate::db::postgres::{get_ledger, PostgresClient};
use crate::errors::{wrap_event_error, LedgerError};
use crate::events::{EventFetcher, RawPositionEvent};
use crate::pricing::PoolPriceCache;

use merge::{build_merge_plan, MergeItem};
use state::LedgerState;
use transition::{apply, ignored_outcome, EventInputs};

/// Bumped whenever the valuation/transition formulas change in a way that
/// existing persisted rows can no longer be trusted to reflect; `pnl::` can
/// use this to detect stale snapshots without re-running `sync`.
pub const CALC_VERSION: i32 = 1;

pub struct LedgerEngine {
    postgres: Arc<PostgresClient>,
    price_cache: Arc<PoolPriceCache>,
}

impl LedgerEngine {
    pub fn new(postgres: Arc<PostgresClient>, price_cache: Arc<PoolPriceCache>) -> Self {
        Self { postgres, price_cache }
    }

    /// Full resync of one position's ledger.
    ///
    /// `pool` and `position_manager` are the on-chain addresses backing
    /// `position.pool_address`/the chain's configured position manager;
    /// `client`/`finality` must belong to `position.pool_chain`, the chain the
    /// pool and position manager contracts actually live on. `token*_decimals`
    /// come from the `token` table rows for `position.pool_address`'s legs.
    pub async fn sync<C: ChainClient>(
        &self,
        client: &C,
        finality: &FinalityPolicy,
        position: &Position,
        pool: Address,
        position_manager: Address,
        token0_decimals: u8,
        token1_decimals: u8,
    ) -> Result<Vec<PositionEvent>, LedgerError> {
        let token_id: U256 = position
            .nft_id
            .parse()
            .map_err(|_| LedgerError::Validation(format!("invalid nft_id {}", position.nft_id)))?;

        let block_info = BlockInfoService::new(client, finality);
        let boundary = block_info
            .last_finalized_block()
            .await
            .map_err(LedgerError::TransientRpc)?;
        let tip = client
            .get_block(BlockTag::Latest)
            .await
            .map_err(LedgerError::TransientRpc)?
            .map(|h| h.number)
            .unwrap_or(0);

        let mut conn = self.postgres.pool.get().await?;
        let txn = conn.transaction().await?;

        let existing = get_ledger(&txn, position.id).await.map_err(LedgerError::Storage)?;

        let from_block = resolve_from_block(existing.is_empty(), boundary);
        let fresh = if from_block <= tip {
            let fetcher = EventFetcher::new(client, position_manager);
            fetcher
                .fetch(token_id, from_block, tip)
                .await
                .map_err(LedgerError::TransientRpc)?
        } else {
            Vec::new()
        };

        let plan = build_merge_plan(&existing, fresh, boundary)?;

        ops::delete_non_final_onchain_events(&txn, position.id, boundary.map(|b| b as i64))
            .await
            .map_err(LedgerError::Storage)?;

        let mut state = plan.initial_state;
        let mut processed = Vec::with_capacity(plan.to_process.len());

        for item in plan.to_process {
            let (row, next_state) = match item {
                MergeItem::Existing(existing_row) => {
                    self.process_existing(client, position, token0_decimals, token1_decimals, state, existing_row)
                        .await?
                },
                MergeItem::Fresh(raw) => {
                    self.process_fresh(client, position, pool, token0_decimals, token1_decimals, state, raw)
                        .await?
                },
            };
            state = next_state;
            ops::upsert_position_event(&txn, &row).await.map_err(LedgerError::Storage)?;
            processed.push(row);
        }

        txn.commit().await?;

        let mut result = existing[..plan.untouched_count].to_vec();
        result.extend(processed);
        Ok(result)
    }

    async fn process_existing<C: ChainClient>(
        &self,
        _client: &C,
        position: &Position,
        decimals0: u8,
        decimals1: u8,
        state: LedgerState,
        row: PositionEvent,
    ) -> Result<(PositionEvent, LedgerState), LedgerError> {
        let outcome = if row.ledger_ignore {
            ignored_outcome(state)
        } else {
            let sqrt_price_x96: U256 = row
                .pool_sqrt_price_x96
                .parse()
                .map_err(|_| LedgerError::Validation("invalid stored pool_sqrt_price_x96".into()))?;
            let delta_liquidity: i128 = row
                .delta_l
                .parse()
                .map_err(|_| LedgerError::Validation("invalid stored delta_l".into()))?;
            let amount0: U256 = row
                .token0_amount
                .parse()
                .map_err(|_| LedgerError::Validation("invalid stored token0_amount".into()))?;
            let amount1: U256 = row
                .token1_amount
                .parse()
                .map_err(|_| LedgerError::Validation("invalid stored token1_amount".into()))?;

            let inputs = EventInputs {
                event_type: row.event_type,
                delta_liquidity: delta_liquidity.unsigned_abs(),
                amount0,
                amount1,
                sqrt_price_x96,
                decimals0,
                decimals1,
                token0_is_quote: position.token0_is_quote,
            };
            apply(state, &inputs).map_err(|e| {
                wrap_event_error(e, row.block_number as u64, row.transaction_index, row.log_index)
            })?
        };

        let new_row = snapshot_row(&row, &outcome);
        Ok((new_row, outcome.new_state))
    }

    async fn process_fresh<C: ChainClient>(
        &self,
        client: &C,
        position: &Position,
        pool: Address,
        decimals0: u8,
        decimals1: u8,
        state: LedgerState,
        raw: RawPositionEvent,
    ) -> Result<(PositionEvent, LedgerState), LedgerError> {
        let price = self
            .price_cache
            .get_sqrt_price_at(client, &position.pool_chain, pool, raw.block_number)
            .await
            .map_err(LedgerError::TransientRpc)?;

        let inputs = EventInputs {
            event_type: raw.event_type,
            delta_liquidity: raw.delta_liquidity,
            amount0: raw.amount0,
            amount1: raw.amount1,
            sqrt_price_x96: price.sqrt_price_x96,
            decimals0,
            decimals1,
            token0_is_quote: position.token0_is_quote,
        };
        let outcome = apply(state, &inputs).map_err(|e| {
            wrap_event_error(e, raw.block_number, raw.transaction_index as i32, raw.log_index as i32)
        })?;

        let signed_delta_l = match raw.event_type {
            DbEventType::IncreaseLiquidity => raw.delta_liquidity as i128,
            DbEventType::DecreaseLiquidity => -(raw.delta_liquidity as i128),
            DbEventType::Collect => 0i128,
        };

        let row = PositionEvent {
            id: Uuid::new_v4(),
            position_id: position.id,
            source: EventSource::Onchain,
            ledger_ignore: false,
            event_type: raw.event_type,
            block_number: raw.block_number as i64,
            transaction_index: raw.transaction_index as i32,
            log_index: raw.log_index as i32,
            block_timestamp: raw.block_timestamp,
            transaction_hash: format!("{:#x}", raw.transaction_hash),
            delta_l: signed_delta_l.to_string(),
            token0_amount: raw.amount0.to_string(),
            token1_amount: raw.amount1.to_string(),
            pool_sqrt_price_x96: price.sqrt_price_x96.to_string(),
            liquidity_after: outcome.new_state.liquidity.to_string(),
            cost_basis_after: outcome.new_state.cost_basis.to_string(),
            realized_pnl_after: outcome.new_state.realized_pnl.to_string(),
            uncollected_principal_0: outcome.new_state.uncollected_0.to_string(),
            uncollected_principal_1: outcome.new_state.uncollected_1.to_string(),
            delta_cost_basis: outcome.delta_cost_basis.to_string(),
            delta_pnl: outcome.delta_pnl.to_string(),
            fee_value_in_quote: outcome.fee_value_in_quote.to_string(),
            token_value_in_quote: outcome.token_value_in_quote.to_string(),
            input_hash: onchain_input_hash(raw.block_number, raw.transaction_index, raw.log_index),
            calc_version: CALC_VERSION,
        };

        Ok((row, outcome.new_state))
    }

    /// Appends a manual ledger row and folds it into the ledger by
    /// immediately re-running `sync`. The row itself is written with zeroed
    /// snapshot columns; `sync` overwrites them in place on its first pass.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_manual_event<C: ChainClient>(
        &self,
        client: &C,
        finality: &FinalityPolicy,
        position: &Position,
        pool: Address,
        position_manager: Address,
        token0_decimals: u8,
        token1_decimals: u8,
        timestamp: chrono::DateTime<Utc>,
        event_type: DbEventType,
        delta_liquidity: i128,
        amount0: U256,
        amount1: U256,
        ledger_ignore: bool,
    ) -> Result<Vec<PositionEvent>, LedgerError> {
        let block_info = BlockInfoService::new(client, finality);
        let block_number = block_info
            .block_at_or_before(timestamp.timestamp() as u64)
            .await
            .map_err(LedgerError::TransientRpc)? as i64;

        let input_hash = manual_input_hash();

        let mut conn = self.postgres.pool.get().await?;
        let txn = conn.transaction().await?;
        if ops::input_hash_exists(&txn, position.id, &input_hash)
            .await
            .map_err(LedgerError::Storage)?
        {
            return Err(LedgerError::InvariantViolation(
                "duplicate manual event input_hash".into(),
            ));
        }
        let log_index = ops::next_manual_log_index(&txn, position.id, block_number)
            .await
            .map_err(LedgerError::Storage)?;

        let placeholder = PositionEvent {
            id: Uuid::new_v4(),
            position_id: position.id,
            source: EventSource::Manual,
            ledger_ignore,
            event_type,
            block_number,
            transaction_index: -1,
            log_index,
            block_timestamp: timestamp,
            transaction_hash: "manual".into(),
            delta_l: delta_liquidity.to_string(),
            token0_amount: amount0.to_string(),
            token1_amount: amount1.to_string(),
            pool_sqrt_price_x96: "0".into(),
            liquidity_after: "0".into(),
            cost_basis_after: "0".into(),
            realized_pnl_after: "0".into(),
            uncollected_principal_0: "0".into(),
            uncollected_principal_1: "0".into(),
            delta_cost_basis: "0".into(),
            delta_pnl: "0".into(),
            fee_value_in_quote: "0".into(),
            token_value_in_quote: "0".into(),
            input_hash,
            calc_version: CALC_VERSION,
        };
        ops::upsert_position_event(&txn, &placeholder).await.map_err(LedgerError::Storage)?;
        txn.commit().await?;

        self.sync(client, finality, position, pool, position_manager, token0_decimals, token1_decimals)
            .await
    }

    /// Administrative hard reset: wipes the ledger, leaving the next
    /// `sync` to rebuild it from genesis.
    pub async fn hard_reset(&self, position_id: Uuid) -> Result<u64, LedgerError> {
        let conn = self.postgres.pool.get().await?;
        ops::hard_reset_ledger(&conn, position_id).await.map_err(LedgerError::Storage)
    }
}

/// §4.G.2: the Event Fetcher's `from_block`. Fetches from the boundary
/// itself, not past it, so a log landing exactly at `F` is still picked up.
/// A position with no existing ledger rows (a brand-new import, or one
/// recovering from a hard reset) has no final segment to resume from
/// regardless of where the boundary currently sits, so it always starts at
/// genesis — otherwise a position imported long after chain genesis would
/// silently skip every event before today's finality boundary.
fn resolve_from_block(existing_is_empty: bool, boundary: Option<u64>) -> u64 {
    if existing_is_empty {
        0
    } else {
        boundary.unwrap_or(0)
    }
}

/// Re-snapshots an existing row in place, preserving its identity columns.
fn snapshot_row(row: &PositionEvent, outcome: &transition::TransitionOutcome) -> PositionEvent {
    PositionEvent {
        liquidity_after: outcome.new_state.liquidity.to_string(),
        cost_basis_after: outcome.new_state.cost_basis.to_string(),
        realized_pnl_after: outcome.new_state.realized_pnl.to_string(),
        uncollected_principal_0: outcome.new_state.uncollected_0.to_string(),
        uncollected_principal_1: outcome.new_state.uncollected_1.to_string(),
        delta_cost_basis: outcome.delta_cost_basis.to_string(),
        delta_pnl: outcome.delta_pnl.to_string(),
        fee_value_in_quote: outcome.fee_value_in_quote.to_string(),
        token_value_in_quote: outcome.token_value_in_quote.to_string(),
        ..row.clone()
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn onchain_input_hash(block_number: u64, transaction_index: u64, log_index: u64) -> String {
    let mut hasher = Md5::new();
    hasher.update(format!("{block_number}|{transaction_index}|{log_index}").as_bytes());
    hex_digest(&hasher.finalize())
}

fn manual_input_hash() -> String {
    let mut hasher = Md5::new();
    hasher.update(format!("manual-{}", Uuid::new_v4()).as_bytes());
    hex_digest(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onchain_input_hash_is_32_hex_chars() {
        let hash = onchain_input_hash(100, 2, 5);
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn onchain_input_hash_is_stable_and_distinguishes_position() {
        assert_eq!(onchain_input_hash(100, 2, 5), onchain_input_hash(100, 2, 5));
        assert_ne!(onchain_input_hash(100, 2, 5), onchain_input_hash(100, 2, 6));
    }

    #[test]
    fn from_block_starts_at_genesis_for_a_position_with_no_ledger_yet() {
        // A freshly imported position (e.g. right after `import_by_nft_id`)
        // has no existing rows; it must backfill from block 0 even though
        // the chain already has a finality boundary well past its mint block.
        assert_eq!(resolve_from_block(true, Some(20_000_000)), 0);
        assert_eq!(resolve_from_block(true, None), 0);
    }

    #[test]
    fn from_block_resumes_at_the_boundary_not_past_it() {
        assert_eq!(resolve_from_block(false, Some(20_000_000)), 20_000_000);
    }

    #[test]
    fn from_block_falls_back_to_genesis_when_the_chain_has_no_boundary_yet() {
        assert_eq!(resolve_from_block(false, None), 0);
    }

    #[test]
    fn manual_input_hash_is_32_hex_chars_and_unique() {
        let a = manual_input_hash();
        let b = manual_input_hash();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
