//! The accumulator threaded through a ledger merge: current liquidity, cost
//! basis, realized PnL, and uncollected principal per token.

use alloy::primitives::I256;

use crate::errors::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerState {
    pub liquidity: u128,
    pub cost_basis: I256,
    pub realized_pnl: I256,
    pub uncollected_0: I256,
    pub uncollected_1: I256,
}

impl LedgerState {
    pub const ZERO: LedgerState = LedgerState {
        liquidity: 0,
        cost_basis: I256::ZERO,
        realized_pnl: I256::ZERO,
        uncollected_0: I256::ZERO,
        uncollected_1: I256::ZERO,
    };

    pub fn parse(
        liquidity: &str,
        cost_basis: &str,
        realized_pnl: &str,
        uncollected_0: &str,
        uncollected_1: &str,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            liquidity: liquidity
                .parse()
                .map_err(|_| LedgerError::Validation(format!("invalid liquidity snapshot {liquidity}")))?,
            cost_basis: parse_signed(cost_basis, "cost_basis")?,
            realized_pnl: parse_signed(realized_pnl, "realized_pnl")?,
            uncollected_0: parse_signed(uncollected_0, "uncollected_principal_0")?,
            uncollected_1: parse_signed(uncollected_1, "uncollected_principal_1")?,
        })
    }

    /// Both uncollected-principal lanes and the cost basis must never go
    /// negative.
    pub fn check_non_negative(&self) -> Result<(), LedgerError> {
        if self.cost_basis.is_negative() {
            return Err(LedgerError::InvariantViolation(format!(
                "cost_basis went negative: {}",
                self.cost_basis
            )));
        }
        if self.uncollected_0.is_negative() {
            return Err(LedgerError::InvariantViolation(format!(
                "uncollected_principal_0 went negative: {}",
                self.uncollected_0
            )));
        }
        if self.uncollected_1.is_negative() {
            return Err(LedgerError::InvariantViolation(format!(
                "uncollected_principal_1 went negative: {}",
                self.uncollected_1
            )));
        }
        Ok(())
    }
}

fn parse_signed(value: &str, field: &str) -> Result<I256, LedgerError> {
    value
        .parse()
        .map_err(|_| LedgerError::Validation(format!("invalid {field} snapshot {value}")))
}
