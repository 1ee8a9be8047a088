//! Pure, DB-free merge-stream construction: decides which existing rows are
//! untouched, which existing rows are reprocessed, and how
//! they interleave with freshly fetched on-chain events. Kept free of I/O so
//! this is exercised directly in unit tests without a database or chain.

use std::collections::HashSet;

use crate::db::models::{EventSource, PositionEvent};
use crate::errors::LedgerError;
use crate::events::RawPositionEvent;

use super::state::LedgerState;

/// One item pending processing by the transition state machine.
pub enum MergeItem {
    /// A manual or `ledger_ignore` row that already exists and is being
    /// recomputed because it falls after the finality boundary.
    Existing(PositionEvent),
    /// A freshly fetched on-chain log with no existing row yet.
    Fresh(RawPositionEvent),
}

impl MergeItem {
    pub fn ordering_key(&self) -> (i64, i64, i64) {
        match self {
            MergeItem::Existing(e) => (e.block_number, e.transaction_index as i64, e.log_index as i64),
            MergeItem::Fresh(e) => (e.block_number as i64, e.transaction_index as i64, e.log_index as i64),
        }
    }

    pub fn ledger_ignore(&self) -> bool {
        match self {
            MergeItem::Existing(e) => e.ledger_ignore,
            MergeItem::Fresh(_) => false,
        }
    }
}

pub struct MergePlan {
    /// After-state of the last surviving final event, or `LedgerState::ZERO`.
    pub initial_state: LedgerState,
    /// Rows before (and including) the finality boundary: never touched again.
    pub untouched_count: usize,
    /// Items strictly after the boundary, sorted by ordering triple.
    pub to_process: Vec<MergeItem>,
}

/// Builds the plan for merging existing ledger rows with freshly fetched
/// on-chain events.
///
/// `existing` must already be sorted by `(block_number, transaction_index,
/// log_index)` ascending (as returned by `get_ledger`). `fresh` is the Event
/// Fetcher's output for `[from_block, tip]`; events whose ordering triple
/// already belongs to an existing final row are dropped here, since refetching
/// exactly at the finality boundary can re-observe a log already persisted as
/// immutable.
pub fn build_merge_plan(
    existing: &[PositionEvent],
    fresh: Vec<RawPositionEvent>,
    finality_boundary: Option<u64>,
) -> Result<MergePlan, LedgerError> {
    let boundary_idx = finality_boundary.and_then(|f| {
        existing.iter().rposition(|e| e.block_number as u64 <= f)
    });

    let initial_state = match boundary_idx {
        Some(idx) => LedgerState::parse(
            &existing[idx].liquidity_after,
            &existing[idx].cost_basis_after,
            &existing[idx].realized_pnl_after,
            &existing[idx].uncollected_principal_0,
            &existing[idx].uncollected_principal_1,
        )?,
        None => LedgerState::ZERO,
    };

    let final_triples: HashSet<(i64, i64, i64)> = match boundary_idx {
        Some(idx) => existing[..=idx]
            .iter()
            .map(|e| (e.block_number, e.transaction_index as i64, e.log_index as i64))
            .collect(),
        None => HashSet::new(),
    };

    let tail_start = boundary_idx.map(|i| i + 1).unwrap_or(0);
    let mut to_process: Vec<MergeItem> = existing[tail_start..]
        .iter()
        .filter(|e| e.source == EventSource::Manual || e.ledger_ignore)
        .cloned()
        .map(MergeItem::Existing)
        .collect();

    for event in fresh {
        let triple = (event.block_number as i64, event.transaction_index as i64, event.log_index as i64);
        if final_triples.contains(&triple) {
            continue;
        }
        to_process.push(MergeItem::Fresh(event));
    }

    to_process.sort_by_key(|item| item.ordering_key());

    let mut seen_non_ignored = HashSet::new();
    for item in &to_process {
        if item.ledger_ignore() {
            continue;
        }
        let key = item.ordering_key();
        if !seen_non_ignored.insert(key) {
            return Err(LedgerError::InvariantViolation(format!(
                "two non-ignored events share ordering triple {key:?}"
            )));
        }
    }

    Ok(MergePlan { initial_state, untouched_count: tail_start, to_process })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{EventType as DbEventType};
    use alloy::primitives::{B256, U256};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn manual_row(block: i64, log_index: i32) -> PositionEvent {
        PositionEvent {
            id: Uuid::new_v4(),
            position_id: Uuid::new_v4(),
            source: EventSource::Manual,
            ledger_ignore: false,
            event_type: DbEventType::IncreaseLiquidity,
            block_number: block,
            transaction_index: -1,
            log_index,
            block_timestamp: Utc.timestamp_opt(0, 0).single().unwrap(),
            transaction_hash: "manual".into(),
            delta_l: "1000".into(),
            token0_amount: "1".into(),
            token1_amount: "1".into(),
            pool_sqrt_price_x96: "0".into(),
            liquidity_after: "1000".into(),
            cost_basis_after: "1".into(),
            realized_pnl_after: "0".into(),
            uncollected_principal_0: "0".into(),
            uncollected_principal_1: "0".into(),
            delta_cost_basis: "1".into(),
            delta_pnl: "0".into(),
            fee_value_in_quote: "0".into(),
            token_value_in_quote: "1".into(),
            input_hash: format!("manual-{block}-{log_index}"),
            calc_version: 1,
        }
    }

    #[test]
    fn no_existing_rows_starts_from_zero_state() {
        let plan = build_merge_plan(&[], Vec::new(), None).unwrap();
        assert_eq!(plan.initial_state, LedgerState::ZERO);
        assert_eq!(plan.untouched_count, 0);
        assert!(plan.to_process.is_empty());
    }

    #[test]
    fn rows_at_or_before_boundary_are_untouched() {
        let existing = vec![manual_row(10, -1), manual_row(20, -1)];
        let plan = build_merge_plan(&existing, Vec::new(), Some(15)).unwrap();
        assert_eq!(plan.untouched_count, 1);
        assert_eq!(plan.to_process.len(), 1);
        assert_eq!(plan.initial_state.liquidity, 1000);
    }

    fn onchain_final_row(block: i64, transaction_index: i32, log_index: i32) -> PositionEvent {
        let mut row = manual_row(block, log_index);
        row.source = EventSource::Onchain;
        row.transaction_index = transaction_index;
        row.transaction_hash = "0xabc".into();
        row
    }

    fn raw_event(block_number: u64, transaction_index: u64, log_index: u64) -> RawPositionEvent {
        RawPositionEvent {
            event_type: DbEventType::IncreaseLiquidity,
            block_number,
            transaction_index,
            log_index,
            transaction_hash: B256::ZERO,
            block_timestamp: Utc.timestamp_opt(0, 0).single().unwrap(),
            delta_liquidity: 500,
            amount0: U256::from(1u64),
            amount1: U256::from(1u64),
        }
    }

    #[test]
    fn fresh_events_at_final_triples_are_dropped() {
        let existing = vec![onchain_final_row(10, 0, 3)];
        let fresh = vec![raw_event(10, 0, 3), raw_event(11, 0, 0)];
        let plan = build_merge_plan(&existing, fresh, Some(10)).unwrap();
        assert_eq!(plan.untouched_count, 1);
        assert_eq!(plan.to_process.len(), 1);
        assert_eq!(plan.to_process[0].ordering_key(), (11, 0, 0));
    }
}
