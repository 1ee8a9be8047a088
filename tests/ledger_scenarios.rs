//! End-to-end scenarios over the ledger engine's pure core (merge-plan
//! construction plus per-event transitions), run entirely in memory: no
//! Postgres connection, no chain client.
//!
//! Every scenario picks a pool sqrt-price of exactly `2^96` (tick zero) so
//! that `token_value_in_quote` reduces to plain addition with zero rounding
//! error, letting assertions on cost basis / realized PnL / fees be exact
//! integers instead of "close to" comparisons.

use alloy::primitives::{B256, I256, U256};
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use ledgerd::db::models::{EventSource, EventType, PositionEvent};
use ledgerd::events::RawPositionEvent;
use ledgerd::ledger::merge::{build_merge_plan, MergeItem};
use ledgerd::ledger::state::LedgerState;
use ledgerd::ledger::transition::{apply, EventInputs};
use ledgerd::math::get_sqrt_ratio_at_tick;

fn tick_zero_sqrt_price() -> U256 {
    get_sqrt_ratio_at_tick(0).unwrap()
}

fn inputs(event_type: EventType, delta_liquidity: u128, amount0: u64, amount1: u64) -> EventInputs {
    EventInputs {
        event_type,
        delta_liquidity,
        amount0: U256::from(amount0),
        amount1: U256::from(amount1),
        sqrt_price_x96: tick_zero_sqrt_price(),
        decimals0: 18,
        decimals1: 6,
        token0_is_quote: false,
    }
}

fn onchain_row(
    block_number: i64,
    transaction_index: i32,
    log_index: i32,
    transaction_hash: &str,
    state: LedgerState,
) -> PositionEvent {
    PositionEvent {
        id: Uuid::new_v4(),
        position_id: Uuid::new_v4(),
        source: EventSource::Onchain,
        ledger_ignore: false,
        event_type: EventType::IncreaseLiquidity,
        block_number,
        transaction_index,
        log_index,
        block_timestamp: Utc.timestamp_opt(0, 0).single().unwrap(),
        transaction_hash: transaction_hash.into(),
        delta_l: "0".into(),
        token0_amount: "0".into(),
        token1_amount: "0".into(),
        pool_sqrt_price_x96: tick_zero_sqrt_price().to_string(),
        liquidity_after: state.liquidity.to_string(),
        cost_basis_after: state.cost_basis.to_string(),
        realized_pnl_after: state.realized_pnl.to_string(),
        uncollected_principal_0: state.uncollected_0.to_string(),
        uncollected_principal_1: state.uncollected_1.to_string(),
        delta_cost_basis: "0".into(),
        delta_pnl: "0".into(),
        fee_value_in_quote: "0".into(),
        token_value_in_quote: "0".into(),
        input_hash: format!("onchain-{block_number}-{transaction_index}-{log_index}"),
        calc_version: 1,
    }
}

fn manual_row(block_number: i64, log_index: i32, delta_liquidity: u128) -> PositionEvent {
    PositionEvent {
        id: Uuid::new_v4(),
        position_id: Uuid::new_v4(),
        source: EventSource::Manual,
        ledger_ignore: false,
        event_type: EventType::IncreaseLiquidity,
        block_number,
        transaction_index: -1,
        log_index,
        block_timestamp: Utc.timestamp_opt(0, 0).single().unwrap(),
        transaction_hash: "manual".into(),
        delta_l: delta_liquidity.to_string(),
        token0_amount: "0".into(),
        token1_amount: "0".into(),
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
        input_hash: format!("manual-{block_number}-{log_index}"),
        calc_version: 1,
    }
}

fn raw_event(
    event_type: EventType,
    block_number: u64,
    transaction_index: u64,
    log_index: u64,
    tx_hash: u8,
    delta_liquidity: u128,
    amount0: u64,
    amount1: u64,
) -> RawPositionEvent {
    RawPositionEvent {
        event_type,
        block_number,
        transaction_index,
        log_index,
        transaction_hash: {
            let mut bytes = [0u8; 32];
            bytes[31] = tx_hash;
            B256::new(bytes)
        },
        block_timestamp: Utc.timestamp_opt(block_number as i64, 0).single().unwrap(),
        delta_liquidity,
        amount0: U256::from(amount0),
        amount1: U256::from(amount1),
    }
}

#[test]
fn scenario_1_simple_open_close() {
    let open = apply(LedgerState::ZERO, &inputs(EventType::IncreaseLiquidity, 1_000, 1_000_000_000_000_000_000, 2_000_000_000))
        .unwrap();
    assert_eq!(open.new_state.liquidity, 1_000);
    assert_eq!(open.new_state.cost_basis, I256::try_from(1_000_000_000_000_000_000i128 + 2_000_000_000).unwrap());
    assert_eq!(open.new_state.realized_pnl, I256::ZERO);
    assert_eq!(open.new_state.uncollected_0, I256::ZERO);
    assert_eq!(open.new_state.uncollected_1, I256::ZERO);

    let close = apply(
        open.new_state,
        &inputs(EventType::DecreaseLiquidity, 1_000, 1_000_000_000_000_000_000, 2_000_000_000),
    )
    .unwrap();
    assert_eq!(close.new_state.liquidity, 0);
    assert_eq!(close.new_state.cost_basis, I256::ZERO);
    assert_eq!(close.new_state.realized_pnl, I256::ZERO);
    assert_eq!(close.new_state.uncollected_0, I256::try_from(1_000_000_000_000_000_000i128).unwrap());
    assert_eq!(close.new_state.uncollected_1, I256::try_from(2_000_000_000i64).unwrap());
}

#[test]
fn scenario_2_collect_separates_fees_from_principal() {
    let mut state = LedgerState::ZERO;
    state.uncollected_0 = I256::try_from(1_000_000_000_000_000_000i128).unwrap();
    state.uncollected_1 = I256::try_from(2_000_000_000i64).unwrap();

    let outcome = apply(state, &inputs(EventType::Collect, 0, 1_000_000_000_000_000_000, 2_100_000_000)).unwrap();

    assert_eq!(outcome.new_state.uncollected_0, I256::ZERO);
    assert_eq!(outcome.new_state.uncollected_1, I256::ZERO);
    assert_eq!(outcome.fee_value_in_quote, I256::try_from(100_000_000i64).unwrap());
    assert_eq!(outcome.delta_cost_basis, I256::ZERO);
    assert_eq!(outcome.delta_pnl, I256::ZERO);
    assert_eq!(outcome.new_state.liquidity, state.liquidity);
}

#[test]
fn scenario_3_partial_decrease_has_proportional_cost() {
    let mut state = LedgerState::ZERO;
    state.liquidity = 1_000;
    state.cost_basis = I256::try_from(6_000_000_000i64).unwrap();

    let outcome = apply(state, &inputs(EventType::DecreaseLiquidity, 250, 0, 1_700_000_000)).unwrap();

    assert_eq!(outcome.delta_cost_basis, -I256::try_from(1_500_000_000i64).unwrap());
    assert_eq!(outcome.delta_pnl, I256::try_from(200_000_000i64).unwrap());
    assert_eq!(outcome.new_state.liquidity, 750);
    assert_eq!(outcome.new_state.cost_basis, I256::try_from(4_500_000_000i64).unwrap());
    assert_eq!(outcome.new_state.realized_pnl, I256::try_from(200_000_000i64).unwrap());
}

#[test]
fn scenario_4_reorg_leaves_final_rows_untouched_and_replaces_non_final() {
    const F: i64 = 100;

    let first_increase = apply(LedgerState::ZERO, &inputs(EventType::IncreaseLiquidity, 1_000, 10, 10)).unwrap();
    let second_increase =
        apply(first_increase.new_state, &inputs(EventType::IncreaseLiquidity, 1_000, 20, 20)).unwrap();

    let existing = vec![
        onchain_row(F, 0, 0, "0xfinal", first_increase.new_state),
        onchain_row(F + 1, 0, 0, "0xstale", second_increase.new_state),
    ];

    // Second sync: the chain now reports F+1's log under a different tx_hash
    // with halved amounts (the original transaction was reorged out).
    let fresh = vec![raw_event(EventType::IncreaseLiquidity, (F + 1) as u64, 0, 0, 0xbb, 1_000, 10, 10)];

    let plan = build_merge_plan(&existing, fresh, Some(F as u64)).unwrap();
    assert_eq!(plan.untouched_count, 1, "the row at F must stay untouched");
    assert_eq!(plan.to_process.len(), 1);

    let replacement = match &plan.to_process[0] {
        MergeItem::Fresh(raw) => raw.clone(),
        MergeItem::Existing(_) => panic!("expected the reorged block to come from fresh events"),
    };
    let replaced = apply(
        plan.initial_state,
        &EventInputs {
            event_type: replacement.event_type,
            delta_liquidity: replacement.delta_liquidity,
            amount0: replacement.amount0,
            amount1: replacement.amount1,
            sqrt_price_x96: tick_zero_sqrt_price(),
            decimals0: 18,
            decimals1: 6,
            token0_is_quote: false,
        },
    )
    .unwrap();

    assert_eq!(plan.initial_state, first_increase.new_state, "state carried from F is unchanged");
    assert_ne!(replaced.new_state.cost_basis, second_increase.new_state.cost_basis);
}

#[test]
fn scenario_5_manual_event_sorts_before_onchain_event_in_same_block() {
    const B: i64 = 50;

    let existing = vec![manual_row(B, -1, 500)];
    let fresh = vec![raw_event(EventType::IncreaseLiquidity, B as u64, 0, 3, 0xaa, 300, 1, 1)];

    let plan = build_merge_plan(&existing, fresh, None).unwrap();
    assert_eq!(plan.to_process.len(), 2);

    let first_is_manual = matches!(plan.to_process[0], MergeItem::Existing(_));
    assert!(first_is_manual, "the manual row (tx_index -1) must sort before the on-chain row");

    let mut state = LedgerState::ZERO;
    for item in &plan.to_process {
        let outcome = match item {
            MergeItem::Existing(row) => apply(
                state,
                &EventInputs {
                    event_type: row.event_type,
                    delta_liquidity: row.delta_l.parse::<i128>().unwrap().unsigned_abs(),
                    amount0: U256::ZERO,
                    amount1: U256::ZERO,
                    sqrt_price_x96: tick_zero_sqrt_price(),
                    decimals0: 18,
                    decimals1: 6,
                    token0_is_quote: false,
                },
            )
            .unwrap(),
            MergeItem::Fresh(raw) => apply(
                state,
                &EventInputs {
                    event_type: raw.event_type,
                    delta_liquidity: raw.delta_liquidity,
                    amount0: raw.amount0,
                    amount1: raw.amount1,
                    sqrt_price_x96: tick_zero_sqrt_price(),
                    decimals0: 18,
                    decimals1: 6,
                    token0_is_quote: false,
                },
            )
            .unwrap(),
        };
        state = outcome.new_state;
    }

    assert_eq!(state.liquidity, 800, "both the manual and on-chain contributions must be folded in");
}

#[test]
fn scenario_6_cost_basis_never_goes_negative() {
    let opened = apply(LedgerState::ZERO, &inputs(EventType::IncreaseLiquidity, 3, 10, 10)).unwrap();
    let err = apply(opened.new_state, &inputs(EventType::DecreaseLiquidity, 4, 1, 1)).unwrap_err();
    assert!(matches!(err, ledgerd::LedgerError::InvariantViolation(_)));
}
