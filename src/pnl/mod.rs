//! PnL Aggregator: reads a position's ledger tail and the pool's
//! current on-chain state and rolls both up into one summary. No teacher
//! analogue exists for this rollup; it follows the general "read
//! materialized state, compute a summary struct, return it" shape of
//! `db/models/pool.rs`'s derived-field structs.

use alloy::primitives::{Address, I256, U256};
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::abis::pool::IUniswapV3Pool;
use crate::abis::position_manager::INonfungiblePositionManager;
use crate::chain::ChainClient;
use crate::db::models::{EventType, Position, PositionPnl};
use crate::db::postgres::{get_ledger, PostgresClient};
use crate::math::{amounts_from_liquidity, get_sqrt_ratio_at_tick, mul_div_floor};

use crate::ledger::valuation::token_value_in_quote;

pub const PNL_CALC_VERSION: i32 = 1;

/// Everything the aggregator needs about the pool beyond what's already on
/// the `Position` row.
pub struct PoolState {
    pub current_tick: i32,
    pub current_sqrt_price_x96: U256,
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,
}

pub struct PnlAggregator {
    postgres: std::sync::Arc<PostgresClient>,
}

impl PnlAggregator {
    pub fn new(postgres: std::sync::Arc<PostgresClient>) -> Self {
        Self { postgres }
    }

    /// Computes and persists the rollup for one position. `pool` and
    /// `position_manager` are the on-chain addresses backing
    /// `position.pool_address` and the chain's configured position manager.
    pub async fn compute<C: ChainClient>(
        &self,
        client: &C,
        position: &Position,
        pool: Address,
        position_manager: Address,
        token0_decimals: u8,
        token1_decimals: u8,
    ) -> Result<PositionPnl> {
        let conn = self.postgres.pool.get().await?;
        let ledger = get_ledger(&conn, position.id).await?;

        let tail = ledger.iter().rev().find(|e| !e.ledger_ignore);

        let (liquidity_after, current_cost_basis, realized_pnl) = match tail {
            Some(row) => (
                row.liquidity_after.parse::<u128>().context("parsing liquidity_after")?,
                parse_i256(&row.cost_basis_after)?,
                parse_i256(&row.realized_pnl_after)?,
            ),
            None => (0u128, I256::ZERO, I256::ZERO),
        };

        let collected_fees = ledger
            .iter()
            .filter(|e| e.event_type == EventType::Collect && !e.ledger_ignore)
            .try_fold(I256::ZERO, |acc, e| -> Result<I256> {
                Ok(acc + parse_i256(&e.fee_value_in_quote)?)
            })?;

        let pool_state = self.read_pool_state(client, pool).await?;

        let (amount0, amount1) = amounts_from_liquidity(
            liquidity_after,
            pool_state.current_sqrt_price_x96,
            get_sqrt_ratio_at_tick(position.tick_lower)?,
            get_sqrt_ratio_at_tick(position.tick_upper)?,
        )
        .map_err(|e| anyhow::anyhow!("computing current position amounts: {e}"))?;

        let current_value = token_value_in_quote(
            amount0,
            amount1,
            pool_state.current_sqrt_price_x96,
            token0_decimals,
            token1_decimals,
            position.token0_is_quote,
        )
        .map_err(|e| anyhow::anyhow!("valuing current position: {e}"))?;

        let unclaimed_fees = self
            .estimate_unclaimed_fees(
                client,
                position,
                position_manager,
                &pool_state,
                liquidity_after,
                token0_decimals,
                token1_decimals,
            )
            .await?;

        let unrealized_pnl = current_value - current_cost_basis;
        let total_pnl = unrealized_pnl + realized_pnl + collected_fees + unclaimed_fees;

        let pnl = PositionPnl {
            position_id: position.id,
            current_value: current_value.to_string(),
            current_cost_basis: current_cost_basis.to_string(),
            realized_pnl: realized_pnl.to_string(),
            collected_fees: collected_fees.to_string(),
            unclaimed_fees: unclaimed_fees.to_string(),
            unrealized_pnl: unrealized_pnl.to_string(),
            total_pnl: total_pnl.to_string(),
            calc_version: PNL_CALC_VERSION,
            computed_at: Utc::now(),
        };

        self.postgres.upsert_position_pnl(&pnl).await?;
        Ok(pnl)
    }

    async fn read_pool_state<C: ChainClient>(&self, client: &C, pool: Address) -> Result<PoolState> {
        let slot0_calldata = IUniswapV3Pool::slot0Call {}.abi_encode();
        let slot0_raw = client.read_contract(pool, slot0_calldata.into(), None).await?;
        let slot0 = IUniswapV3Pool::slot0Call::abi_decode_returns(&slot0_raw).context("decoding slot0")?;

        let fg0_calldata = IUniswapV3Pool::feeGrowthGlobal0X128Call {}.abi_encode();
        let fg0_raw = client.read_contract(pool, fg0_calldata.into(), None).await?;
        let fee_growth_global_0_x128 =
            IUniswapV3Pool::feeGrowthGlobal0X128Call::abi_decode_returns(&fg0_raw)
                .context("decoding feeGrowthGlobal0X128")?;

        let fg1_calldata = IUniswapV3Pool::feeGrowthGlobal1X128Call {}.abi_encode();
        let fg1_raw = client.read_contract(pool, fg1_calldata.into(), None).await?;
        let fee_growth_global_1_x128 =
            IUniswapV3Pool::feeGrowthGlobal1X128Call::abi_decode_returns(&fg1_raw)
                .context("decoding feeGrowthGlobal1X128")?;

        Ok(PoolState {
            current_tick: slot0.tick.as_i32(),
            current_sqrt_price_x96: slot0.sqrtPriceX96,
            fee_growth_global_0_x128,
            fee_growth_global_1_x128,
        })
    }

    /// Approximates the fee growth accrued since the position manager last
    /// recorded `feeGrowthInside*LastX128`, using the pool's global fee
    /// growth counters as a stand-in for true feeGrowthInside: per-tick
    /// `feeGrowthOutside` reads aren't part of this service's on-chain
    /// contract surface, so this slightly overstates fees for a position
    /// whose range isn't currently in the money (global growth always
    /// accrues; feeGrowthInside only accrues while the tick is in range).
    #[allow(clippy::too_many_arguments)]
    async fn estimate_unclaimed_fees<C: ChainClient>(
        &self,
        client: &C,
        position: &Position,
        position_manager: Address,
        pool_state: &PoolState,
        liquidity: u128,
        decimals0: u8,
        decimals1: u8,
    ) -> Result<I256> {
        if liquidity == 0 {
            return Ok(I256::ZERO);
        }

        let token_id: U256 = position.nft_id.parse().context("parsing nft_id")?;
        let calldata = INonfungiblePositionManager::positionsCall { tokenId: token_id }.abi_encode();
        let raw = client.read_contract(position_manager, calldata.into(), None).await?;
        let decoded = INonfungiblePositionManager::positionsCall::abi_decode_returns(&raw)
            .context("decoding positions() for unclaimed fee estimate")?;

        let growth0_delta = pool_state
            .fee_growth_global_0_x128
            .wrapping_sub(decoded.feeGrowthInside0LastX128);
        let growth1_delta = pool_state
            .fee_growth_global_1_x128
            .wrapping_sub(decoded.feeGrowthInside1LastX128);

        let q128 = U256::from(1u8) << 128;
        let fee0 = mul_div_floor(growth0_delta, U256::from(liquidity), q128)
            .map_err(|e| anyhow::anyhow!("computing unclaimed fee_0: {e}"))?;
        let fee1 = mul_div_floor(growth1_delta, U256::from(liquidity), q128)
            .map_err(|e| anyhow::anyhow!("computing unclaimed fee_1: {e}"))?;

        token_value_in_quote(
            fee0,
            fee1,
            pool_state.current_sqrt_price_x96,
            decimals0,
            decimals1,
            position.token0_is_quote,
        )
        .map_err(|e| anyhow::anyhow!("valuing unclaimed fees: {e}"))
    }
}

fn parse_i256(value: &str) -> Result<I256> {
    value.parse().with_context(|| format!("parsing signed 256-bit snapshot {value}"))
}

/// Looks up a position by its surrogate id and, if found, ensures the
/// PnL cache entry for it, otherwise returns `None` without erroring.
pub async fn get_pnl(postgres: &PostgresClient, position_id: Uuid) -> Result<Option<PositionPnl>> {
    postgres.get_position_pnl(position_id).await
}
