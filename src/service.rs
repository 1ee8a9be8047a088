//! Composition root: explicit construction, dependencies passed by reference
//! or Arc, no service locator, no global singleton. `Services`
//! owns one instance of each stateful component and is the only type
//! `bin/server.rs` and the background jobs construct calls through;
//! everything else in this crate is either stateless or takes its
//! dependencies as arguments.

use std::sync::Arc;

use alloy::primitives::U256;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chain::ChainRegistry;
use crate::concurrency::{PositionKey, PositionLocks};
use crate::curve::CurveGenerator;
use crate::db::models::{EventType, Pool, Position, PositionCurve, PositionPnl, Token};
use crate::db::postgres::{get_position, get_position_by_identity, list_active_positions};
use crate::db::Database;
use crate::importer::{DiscoveredPosition, Importer};
use crate::ledger::LedgerEngine;
use crate::pnl::PnlAggregator;
use crate::pricing::PoolPriceCache;

pub struct Services {
    pub db: Database,
    pub chains: Arc<ChainRegistry>,
    pub price_cache: Arc<PoolPriceCache>,
    pub ledger: LedgerEngine,
    pub pnl: PnlAggregator,
    pub curve: CurveGenerator,
    pub importer: Importer,
    pub locks: Arc<PositionLocks>,
    protocol: String,
}

impl Services {
    pub fn new(db: Database, chains: Arc<ChainRegistry>, protocol: impl Into<String>) -> Self {
        let price_cache = Arc::new(PoolPriceCache::new(db.postgres.clone()));
        let ledger = LedgerEngine::new(db.postgres.clone(), price_cache.clone());
        let pnl = PnlAggregator::new(db.postgres.clone());
        let curve = CurveGenerator::new(db.postgres.clone());
        let importer = Importer::new(db.postgres.clone());
        let locks = Arc::new(PositionLocks::new());

        Self { db, chains, price_cache, ledger, pnl, curve, importer, locks, protocol: protocol.into() }
    }

    /// Re-syncs one position's ledger and rolls its PnL and curve caches
    /// forward behind the per-position lock. Identity lookup is by the
    /// business key, not the surrogate id, since callers (a resync sweep, an
    /// HTTP handler) know the NFT id, not the row's UUID.
    pub async fn sync(&self, user_id: Uuid, chain: &str, nft_id: &str) -> Result<Position> {
        let key = PositionKey::new(user_id.to_string(), chain, &self.protocol, nft_id);
        let _guard = self.locks.acquire(&key).await;

        let conn = self.db.postgres.pool.get().await?;
        let position = get_position_by_identity(&conn, user_id, chain, &self.protocol, nft_id)
            .await?
            .with_context(|| format!("no position for ({user_id}, {chain}, {}, {nft_id})", self.protocol))?;
        drop(conn);

        self.sync_locked(&position).await
    }

    /// Callers that already hold the position's lock (e.g. `add_manual_event`,
    /// the background resync sweep iterating `list_active_positions` under
    /// their own per-position lock) call this directly to avoid deadlocking on
    /// a re-entrant `acquire`.
    pub async fn sync_locked(&self, position: &Position) -> Result<Position> {
        let chain_handle = self.chains.get(&position.pool_chain)?;
        let (pool, token0, token1) = self.load_pool_and_tokens(position).await?;

        let pool_address = pool.address.parse().context("invalid pool address stored on pool row")?;
        let position_manager = chain_handle.position_manager_address()?;

        let ledger = self
            .ledger
            .sync(
                &*chain_handle.client,
                &chain_handle.settings.finality,
                position,
                pool_address,
                position_manager,
                token0.decimals as u8,
                token1.decimals as u8,
            )
            .await
            .map_err(|e| anyhow::anyhow!("syncing position {}: {e}", position.id))?;

        let liquidity_after = ledger
            .iter()
            .rev()
            .find(|e| !e.ledger_ignore)
            .map(|e| e.liquidity_after.clone())
            .unwrap_or_else(|| "0".to_string());

        let mut updated = position.clone();
        updated.liquidity = liquidity_after;
        updated.updated_at = Utc::now();
        self.upsert_position(&updated).await?;

        self.pnl
            .compute(&*chain_handle.client, &updated, pool_address, position_manager, token0.decimals as u8, token1.decimals as u8)
            .await?;
        self.curve.invalidate(updated.id).await?;

        Ok(updated)
    }

    /// Appends a manual adjustment and folds it into the position's ledger
    ///, under the same per-position lock `sync` uses.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_manual_event(
        &self,
        user_id: Uuid,
        chain: &str,
        nft_id: &str,
        timestamp: DateTime<Utc>,
        event_type: EventType,
        delta_liquidity: i128,
        amount0: U256,
        amount1: U256,
        ledger_ignore: bool,
    ) -> Result<Position> {
        let key = PositionKey::new(user_id.to_string(), chain, &self.protocol, nft_id);
        let _guard = self.locks.acquire(&key).await;

        let conn = self.db.postgres.pool.get().await?;
        let position = get_position_by_identity(&conn, user_id, chain, &self.protocol, nft_id)
            .await?
            .with_context(|| format!("no position for ({user_id}, {chain}, {}, {nft_id})", self.protocol))?;
        drop(conn);

        let chain_handle = self.chains.get(&position.pool_chain)?;
        let (pool, token0, token1) = self.load_pool_and_tokens(&position).await?;
        let pool_address = pool.address.parse().context("invalid pool address stored on pool row")?;
        let position_manager = chain_handle.position_manager_address()?;

        self.ledger
            .add_manual_event(
                &*chain_handle.client,
                &chain_handle.settings.finality,
                &position,
                pool_address,
                position_manager,
                token0.decimals as u8,
                token1.decimals as u8,
                timestamp,
                event_type,
                delta_liquidity,
                amount0,
                amount1,
                ledger_ignore,
            )
            .await
            .map_err(|e| anyhow::anyhow!("adding manual event for {}: {e}", position.id))?;

        self.sync_locked(&position).await
    }

    pub async fn get_pnl(&self, position_id: Uuid) -> Result<Option<PositionPnl>> {
        self.db.postgres.get_position_pnl(position_id).await
    }

    /// Returns the cached curve, regenerating it first if it's missing or
    /// flagged invalid.
    pub async fn get_curve(&self, position_id: Uuid) -> Result<PositionCurve> {
        if let Some(cached) = self.db.postgres.get_position_curve(position_id).await? {
            if cached.is_valid {
                return Ok(cached);
            }
        }

        let conn = self.db.postgres.pool.get().await?;
        let position = get_position(&conn, position_id)
            .await?
            .with_context(|| format!("no position with id {position_id}"))?;
        drop(conn);

        let chain_handle = self.chains.get(&position.pool_chain)?;
        let (pool, token0, token1) = self.load_pool_and_tokens(&position).await?;
        let pnl = self
            .db
            .postgres
            .get_position_pnl(position_id)
            .await?
            .with_context(|| format!("position {position_id} has no PnL snapshot yet; sync first"))?;

        let pool_tick = pool.current_tick.context("pool has no cached current_tick; sync the position first")?;
        let pool_sqrt_price_x96: alloy::primitives::U256 = pool
            .current_sqrt_price_x96
            .as_deref()
            .context("pool has no cached current_sqrt_price_x96; sync the position first")?
            .parse()
            .context("invalid cached current_sqrt_price_x96")?;
        let cost_basis_after: alloy::primitives::I256 =
            pnl.current_cost_basis.parse().context("invalid cached current_cost_basis")?;
        let liquidity: u128 = position.liquidity.parse().context("invalid stored liquidity")?;

        self.curve
            .regenerate(
                position_id,
                liquidity,
                position.tick_lower,
                position.tick_upper,
                pool.tick_spacing,
                cost_basis_after,
                position.token0_is_quote,
                token0.decimals as u8,
                token1.decimals as u8,
                pool_tick,
                pool_sqrt_price_x96,
            )
            .await
    }

    pub async fn discover_by_owner(
        &self,
        user_id: Uuid,
        chain: &str,
        owner_address: &str,
        limit: usize,
    ) -> Result<Vec<DiscoveredPosition>> {
        let chain_handle = self.chains.get(chain)?;
        let position_manager = chain_handle.position_manager_address()?;
        let owner = owner_address.parse().context("invalid owner address")?;

        self.importer
            .discover_by_owner(&*chain_handle.client, chain, &self.protocol, user_id, position_manager, owner, limit)
            .await
    }

    /// Imports one NFT id, persists the resulting `Position` row, and runs an
    /// initial `sync` so its PnL/curve caches are populated before returning.
    pub async fn import_by_nft_id(&self, user_id: Uuid, chain: &str, nft_id_decimal: &str) -> Result<Position> {
        let chain_handle = self.chains.get(chain)?;
        let token_id: U256 = nft_id_decimal.parse().context("invalid nft_id")?;
        let position_manager = chain_handle.position_manager_address()?;
        let factory = chain_handle.factory_address()?;
        let wrapped_native = chain_handle.settings.wrapped_native_address.clone();

        let position = self
            .importer
            .import_by_nft_id(
                &*chain_handle.client,
                chain,
                &self.protocol,
                user_id,
                position_manager,
                factory,
                &wrapped_native,
                token_id,
            )
            .await?;

        self.upsert_position(&position).await?;
        self.sync_locked(&position).await
    }

    /// Wipes one position's ledger and rebuilds it from genesis.
    pub async fn hard_reset(&self, position_id: Uuid) -> Result<Position> {
        let conn = self.db.postgres.pool.get().await?;
        let position = get_position(&conn, position_id)
            .await?
            .with_context(|| format!("no position with id {position_id}"))?;
        drop(conn);

        let key = PositionKey::new(position.user_id.to_string(), &position.chain, &self.protocol, &position.nft_id);
        let _guard = self.locks.acquire(&key).await;

        self.ledger.hard_reset(position_id).await.map_err(|e| anyhow::anyhow!("hard reset {position_id}: {e}"))?;
        self.sync_locked(&position).await
    }

    /// Background resync sweep target: the periodic re-sync sweep over
    /// active positions.
    pub async fn active_positions(&self) -> Result<Vec<Position>> {
        let conn = self.db.postgres.pool.get().await?;
        list_active_positions(&conn).await
    }

    async fn load_pool_and_tokens(&self, position: &Position) -> Result<(Pool, Token, Token)> {
        let pool = self
            .db
            .postgres
            .get_pool(&position.pool_chain, &position.pool_address)
            .await?
            .with_context(|| format!("no pool row for {}/{}", position.pool_chain, position.pool_address))?;
        let token0 = self
            .db
            .postgres
            .get_token(&pool.chain, &pool.token0)
            .await?
            .with_context(|| format!("no token row for {}", pool.token0))?;
        let token1 = self
            .db
            .postgres
            .get_token(&pool.chain, &pool.token1)
            .await?
            .with_context(|| format!("no token row for {}", pool.token1))?;
        Ok((pool, token0, token1))
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        let conn = self.db.postgres.pool.get().await?;
        crate::db::postgres::upsert_position(&conn, position).await
    }
}
