//! Per-event-type state transitions: the three lifecycle events each fold
//! into the running `LedgerState` differently. Pure
//! functions over exact integers; no I/O.

use alloy::primitives::{I256, U256};

use crate::db::models::EventType;
use crate::errors::LedgerError;
use crate::math::mul_div_floor;

use super::state::LedgerState;
use super::valuation::token_value_in_quote;

/// Everything a transition needs about one event beyond the running state.
pub struct EventInputs {
    pub event_type: EventType,
    /// Magnitude of the liquidity delta. Zero for `Collect`.
    pub delta_liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
    pub sqrt_price_x96: U256,
    pub decimals0: u8,
    pub decimals1: u8,
    pub token0_is_quote: bool,
}

/// Everything a processed row needs beyond its raw inputs and after-state.
pub struct TransitionOutcome {
    pub new_state: LedgerState,
    pub delta_cost_basis: I256,
    pub delta_pnl: I256,
    pub fee_value_in_quote: I256,
    pub token_value_in_quote: I256,
}

/// `ledger_ignore` rows never touch the running state: the caller should use
/// this directly instead of calling `apply` for them.
pub fn ignored_outcome(state: LedgerState) -> TransitionOutcome {
    TransitionOutcome {
        new_state: state,
        delta_cost_basis: I256::ZERO,
        delta_pnl: I256::ZERO,
        fee_value_in_quote: I256::ZERO,
        token_value_in_quote: I256::ZERO,
    }
}

pub fn apply(state: LedgerState, inputs: &EventInputs) -> Result<TransitionOutcome, LedgerError> {
    let value = token_value_in_quote(
        inputs.amount0,
        inputs.amount1,
        inputs.sqrt_price_x96,
        inputs.decimals0,
        inputs.decimals1,
        inputs.token0_is_quote,
    )?;

    match inputs.event_type {
        EventType::IncreaseLiquidity => apply_increase(state, inputs, value),
        EventType::DecreaseLiquidity => apply_decrease(state, inputs, value),
        EventType::Collect => apply_collect(state, inputs, value),
    }
}

fn apply_increase(
    state: LedgerState,
    inputs: &EventInputs,
    value: I256,
) -> Result<TransitionOutcome, LedgerError> {
    let liquidity = state
        .liquidity
        .checked_add(inputs.delta_liquidity)
        .ok_or_else(|| LedgerError::InvariantViolation("liquidity overflowed u128 on increase".into()))?;
    let cost_basis = state
        .cost_basis
        .checked_add(value)
        .ok_or_else(|| LedgerError::InvariantViolation("cost_basis overflowed on increase".into()))?;

    let new_state = LedgerState { liquidity, cost_basis, ..state };
    new_state.check_non_negative()?;

    Ok(TransitionOutcome {
        new_state,
        delta_cost_basis: value,
        delta_pnl: I256::ZERO,
        fee_value_in_quote: I256::ZERO,
        token_value_in_quote: value,
    })
}

fn apply_decrease(
    state: LedgerState,
    inputs: &EventInputs,
    value: I256,
) -> Result<TransitionOutcome, LedgerError> {
    if inputs.delta_liquidity > state.liquidity {
        return Err(LedgerError::InvariantViolation(format!(
            "decrease of {} exceeds prior liquidity {}",
            inputs.delta_liquidity, state.liquidity
        )));
    }

    let proportional_cost = if state.liquidity == 0 {
        I256::ZERO
    } else {
        let cost_basis_u256 = u256_from_non_negative(state.cost_basis)?;
        let ratio = mul_div_floor(cost_basis_u256, U256::from(inputs.delta_liquidity), U256::from(state.liquidity))
            .map_err(|e| LedgerError::Validation(format!("proportional cost computation failed: {e}")))?;
        i256_from_non_negative(ratio)?
    };

    let delta_pnl = value
        .checked_sub(proportional_cost)
        .ok_or_else(|| LedgerError::InvariantViolation("delta_pnl overflowed on decrease".into()))?;

    let liquidity = state.liquidity - inputs.delta_liquidity;
    let cost_basis = state
        .cost_basis
        .checked_sub(proportional_cost)
        .ok_or_else(|| LedgerError::InvariantViolation("cost_basis underflowed on decrease".into()))?;
    let realized_pnl = state
        .realized_pnl
        .checked_add(delta_pnl)
        .ok_or_else(|| LedgerError::InvariantViolation("realized_pnl overflowed on decrease".into()))?;
    let uncollected_0 = state
        .uncollected_0
        .checked_add(i256_from_u256(inputs.amount0)?)
        .ok_or_else(|| LedgerError::InvariantViolation("uncollected_principal_0 overflowed".into()))?;
    let uncollected_1 = state
        .uncollected_1
        .checked_add(i256_from_u256(inputs.amount1)?)
        .ok_or_else(|| LedgerError::InvariantViolation("uncollected_principal_1 overflowed".into()))?;

    let new_state = LedgerState { liquidity, cost_basis, realized_pnl, uncollected_0, uncollected_1 };
    new_state.check_non_negative()?;

    Ok(TransitionOutcome {
        new_state,
        delta_cost_basis: -proportional_cost,
        delta_pnl,
        fee_value_in_quote: I256::ZERO,
        token_value_in_quote: value,
    })
}

fn apply_collect(state: LedgerState, inputs: &EventInputs, value: I256) -> Result<TransitionOutcome, LedgerError> {
    let amount0 = i256_from_u256(inputs.amount0)?;
    let amount1 = i256_from_u256(inputs.amount1)?;

    let principal0 = amount0.min(state.uncollected_0).max(I256::ZERO);
    let principal1 = amount1.min(state.uncollected_1).max(I256::ZERO);
    let fee0 = (amount0 - principal0).max(I256::ZERO);
    let fee1 = (amount1 - principal1).max(I256::ZERO);

    let fee_value_in_quote = token_value_in_quote(
        u256_from_non_negative(fee0)?,
        u256_from_non_negative(fee1)?,
        inputs.sqrt_price_x96,
        inputs.decimals0,
        inputs.decimals1,
        inputs.token0_is_quote,
    )?;

    let uncollected_0 = state.uncollected_0 - principal0;
    let uncollected_1 = state.uncollected_1 - principal1;
    let new_state = LedgerState { uncollected_0, uncollected_1, ..state };
    new_state.check_non_negative()?;

    Ok(TransitionOutcome {
        new_state,
        delta_cost_basis: I256::ZERO,
        delta_pnl: I256::ZERO,
        fee_value_in_quote,
        token_value_in_quote: value,
    })
}

fn u256_from_non_negative(value: I256) -> Result<U256, LedgerError> {
    if value.is_negative() {
        return Err(LedgerError::InvariantViolation(format!("expected non-negative value, got {value}")));
    }
    Ok(value.into_raw())
}

fn i256_from_non_negative(value: U256) -> Result<I256, LedgerError> {
    if value.bit_len() >= 255 {
        return Err(LedgerError::InvariantViolation("value does not fit in a signed 256-bit integer".into()));
    }
    Ok(I256::from_raw(value))
}

fn i256_from_u256(value: U256) -> Result<I256, LedgerError> {
    i256_from_non_negative(value)
}
