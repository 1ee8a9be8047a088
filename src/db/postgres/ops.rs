use log::error;
use tokio_postgres::GenericClient;
use uuid::Uuid;

use crate::db::models::{
    CurvePoint, EventSource, EventType, ImportType, Pool, PoolPriceCacheEntry, Position,
    PositionCurve, PositionEvent, PositionPnl, PositionStatus, Token,
};
use crate::db::postgres::PostgresClient;

/// Strips null bytes, which Postgres rejects in `text` columns outright.
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

// ==================== POSITIONS ====================

pub async fn get_position<C: GenericClient>(client: &C, id: Uuid) -> anyhow::Result<Option<Position>> {
    let row = client
        .query_opt(
            r#"
            SELECT id, user_id, chain, protocol, nft_id, pool_chain, pool_address,
                   tick_lower, tick_upper, liquidity, token0_is_quote, owner,
                   import_type, status, created_at, updated_at
            FROM position WHERE id = $1
            "#,
            &[&id],
        )
        .await?;
    Ok(row.map(row_to_position))
}

pub async fn get_position_by_identity<C: GenericClient>(
    client: &C,
    user_id: Uuid,
    chain: &str,
    protocol: &str,
    nft_id: &str,
) -> anyhow::Result<Option<Position>> {
    let row = client
        .query_opt(
            r#"
            SELECT id, user_id, chain, protocol, nft_id, pool_chain, pool_address,
                   tick_lower, tick_upper, liquidity, token0_is_quote, owner,
                   import_type, status, created_at, updated_at
            FROM position
            WHERE user_id = $1 AND chain = $2 AND protocol = $3 AND nft_id = $4
            "#,
            &[&user_id, &chain, &protocol, &nft_id],
        )
        .await?;
    Ok(row.map(row_to_position))
}

pub async fn list_active_positions<C: GenericClient>(client: &C) -> anyhow::Result<Vec<Position>> {
    let rows = client
        .query(
            r#"
            SELECT id, user_id, chain, protocol, nft_id, pool_chain, pool_address,
                   tick_lower, tick_upper, liquidity, token0_is_quote, owner,
                   import_type, status, created_at, updated_at
            FROM position WHERE status = 'active'
            "#,
            &[],
        )
        .await?;
    Ok(rows.into_iter().map(row_to_position).collect())
}

pub async fn upsert_position<C: GenericClient>(client: &C, position: &Position) -> anyhow::Result<()> {
    client
        .execute(
            r#"
            INSERT INTO position (
                id, user_id, chain, protocol, nft_id, pool_chain, pool_address,
                tick_lower, tick_upper, liquidity, token0_is_quote, owner,
                import_type, status, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            ON CONFLICT (user_id, chain, protocol, nft_id) DO UPDATE SET
                pool_chain = EXCLUDED.pool_chain,
                pool_address = EXCLUDED.pool_address,
                tick_lower = EXCLUDED.tick_lower,
                tick_upper = EXCLUDED.tick_upper,
                liquidity = EXCLUDED.liquidity,
                owner = EXCLUDED.owner,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
            &[
                &position.id,
                &position.user_id,
                &position.chain,
                &position.protocol,
                &position.nft_id,
                &position.pool_chain,
                &position.pool_address,
                &position.tick_lower,
                &position.tick_upper,
                &position.liquidity,
                &position.token0_is_quote,
                &position.owner,
                &position.import_type.as_str(),
                &position.status.as_str(),
                &position.created_at,
                &position.updated_at,
            ],
        )
        .await
        .map_err(|e| {
            error!("failed to upsert position {}: {e:?}", position.id);
            e
        })?;
    Ok(())
}

fn row_to_position(row: tokio_postgres::Row) -> Position {
    let import_type: String = row.get("import_type");
    let status: String = row.get("status");
    Position {
        id: row.get("id"),
        user_id: row.get("user_id"),
        chain: row.get("chain"),
        protocol: row.get("protocol"),
        nft_id: row.get("nft_id"),
        pool_chain: row.get("pool_chain"),
        pool_address: row.get("pool_address"),
        tick_lower: row.get("tick_lower"),
        tick_upper: row.get("tick_upper"),
        liquidity: row.get("liquidity"),
        token0_is_quote: row.get("token0_is_quote"),
        owner: row.get("owner"),
        import_type: ImportType::parse(&import_type).unwrap_or(ImportType::Manual),
        status: PositionStatus::parse(&status).unwrap_or(PositionStatus::Active),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ==================== POOLS & TOKENS ====================

impl PostgresClient {
    pub async fn get_pool(&self, chain: &str, address: &str) -> anyhow::Result<Option<Pool>> {
        let client = self.pool.get().await?;
        get_pool(&*client, chain, address).await
    }

    pub async fn upsert_pool(&self, pool: &Pool) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        upsert_pool(&*client, pool).await
    }

    pub async fn get_token(&self, chain: &str, address: &str) -> anyhow::Result<Option<Token>> {
        let client = self.pool.get().await?;
        get_token(&*client, chain, address).await
    }

    pub async fn upsert_token(&self, token: &Token) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        upsert_token(&*client, token).await
    }
}

pub async fn get_pool<C: GenericClient>(client: &C, chain: &str, address: &str) -> anyhow::Result<Option<Pool>> {
    let row = client
        .query_opt(
            r#"
            SELECT chain, address, protocol, fee, tick_spacing, token0, token1,
                   current_tick, current_sqrt_price_x96,
                   fee_growth_global_0, fee_growth_global_1, updated_at
            FROM pool WHERE chain = $1 AND address = $2
            "#,
            &[&chain, &address],
        )
        .await?;
    Ok(row.map(|row| Pool {
        chain: row.get("chain"),
        address: row.get("address"),
        protocol: row.get("protocol"),
        fee: row.get("fee"),
        tick_spacing: row.get("tick_spacing"),
        token0: row.get("token0"),
        token1: row.get("token1"),
        current_tick: row.get("current_tick"),
        current_sqrt_price_x96: row.get("current_sqrt_price_x96"),
        fee_growth_global_0: row.get("fee_growth_global_0"),
        fee_growth_global_1: row.get("fee_growth_global_1"),
        updated_at: row.get("updated_at"),
    }))
}

pub async fn upsert_pool<C: GenericClient>(client: &C, pool: &Pool) -> anyhow::Result<()> {
    client
        .execute(
            r#"
            INSERT INTO pool (
                chain, address, protocol, fee, tick_spacing, token0, token1,
                current_tick, current_sqrt_price_x96,
                fee_growth_global_0, fee_growth_global_1, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            ON CONFLICT (chain, address) DO UPDATE SET
                current_tick = EXCLUDED.current_tick,
                current_sqrt_price_x96 = EXCLUDED.current_sqrt_price_x96,
                fee_growth_global_0 = EXCLUDED.fee_growth_global_0,
                fee_growth_global_1 = EXCLUDED.fee_growth_global_1,
                updated_at = EXCLUDED.updated_at
            "#,
            &[
                &pool.chain,
                &pool.address,
                &pool.protocol,
                &pool.fee,
                &pool.tick_spacing,
                &pool.token0,
                &pool.token1,
                &pool.current_tick,
                &pool.current_sqrt_price_x96,
                &pool.fee_growth_global_0,
                &pool.fee_growth_global_1,
                &pool.updated_at,
            ],
        )
        .await?;
    Ok(())
}

pub async fn get_token<C: GenericClient>(client: &C, chain: &str, address: &str) -> anyhow::Result<Option<Token>> {
    let row = client
        .query_opt(
            "SELECT chain, address, symbol, name, decimals, verified FROM token WHERE chain = $1 AND address = $2",
            &[&chain, &address],
        )
        .await?;
    Ok(row.map(|row| Token {
        chain: row.get("chain"),
        address: row.get("address"),
        symbol: row.get("symbol"),
        name: row.get("name"),
        decimals: row.get("decimals"),
        verified: row.get("verified"),
    }))
}

pub async fn upsert_token<C: GenericClient>(client: &C, token: &Token) -> anyhow::Result<()> {
    client
        .execute(
            r#"
            INSERT INTO token (chain, address, symbol, name, decimals, verified)
            VALUES ($1,$2,$3,$4,$5,$6)
            ON CONFLICT (chain, address) DO UPDATE SET
                symbol = EXCLUDED.symbol,
                name = EXCLUDED.name,
                decimals = EXCLUDED.decimals,
                verified = EXCLUDED.verified
            "#,
            &[
                &token.chain,
                &token.address,
                &sanitize_string(&token.symbol),
                &sanitize_string(&token.name),
                &token.decimals,
                &token.verified,
            ],
        )
        .await?;
    Ok(())
}

// ==================== POSITION EVENTS (LEDGER) ====================

/// Full ledger for a position, ordered per spec invariant 1:
/// `(block_number, transaction_index, log_index)` ascending.
pub async fn get_ledger<C: GenericClient>(client: &C, position_id: Uuid) -> anyhow::Result<Vec<PositionEvent>> {
    let rows = client
        .query(
            r#"
            SELECT id, position_id, source, ledger_ignore, event_type, block_number,
                   transaction_index, log_index, block_timestamp, transaction_hash,
                   delta_l, token0_amount, token1_amount, pool_sqrt_price_x96,
                   liquidity_after, cost_basis_after, realized_pnl_after,
                   uncollected_principal_0, uncollected_principal_1,
                   delta_cost_basis, delta_pnl, fee_value_in_quote, token_value_in_quote,
                   input_hash, calc_version
            FROM position_event
            WHERE position_id = $1
            ORDER BY block_number ASC, transaction_index ASC, log_index ASC
            "#,
            &[&position_id],
        )
        .await?;
    Ok(rows.into_iter().map(row_to_event).collect())
}

fn row_to_event(row: tokio_postgres::Row) -> PositionEvent {
    let source: String = row.get("source");
    let event_type: String = row.get("event_type");
    PositionEvent {
        id: row.get("id"),
        position_id: row.get("position_id"),
        source: EventSource::parse(&source).unwrap_or(EventSource::Onchain),
        ledger_ignore: row.get("ledger_ignore"),
        event_type: EventType::parse(&event_type).expect("unknown event_type in database"),
        block_number: row.get("block_number"),
        transaction_index: row.get("transaction_index"),
        log_index: row.get("log_index"),
        block_timestamp: row.get("block_timestamp"),
        transaction_hash: row.get("transaction_hash"),
        delta_l: row.get("delta_l"),
        token0_amount: row.get("token0_amount"),
        token1_amount: row.get("token1_amount"),
        pool_sqrt_price_x96: row.get("pool_sqrt_price_x96"),
        liquidity_after: row.get("liquidity_after"),
        cost_basis_after: row.get("cost_basis_after"),
        realized_pnl_after: row.get("realized_pnl_after"),
        uncollected_principal_0: row.get("uncollected_principal_0"),
        uncollected_principal_1: row.get("uncollected_principal_1"),
        delta_cost_basis: row.get("delta_cost_basis"),
        delta_pnl: row.get("delta_pnl"),
        fee_value_in_quote: row.get("fee_value_in_quote"),
        token_value_in_quote: row.get("token_value_in_quote"),
        input_hash: row.get("input_hash"),
        calc_version: row.get("calc_version"),
    }
}

/// Deletion policy for a resync: removes only non-final, non-ignored on-chain
/// rows. `boundary = None` means the chain has no finality boundary yet, so
/// every on-chain row is non-final.
pub async fn delete_non_final_onchain_events<C: GenericClient>(
    client: &C,
    position_id: Uuid,
    boundary: Option<i64>,
) -> anyhow::Result<u64> {
    let count = match boundary {
        Some(f) => {
            client
                .execute(
                    r#"
                    DELETE FROM position_event
                    WHERE position_id = $1 AND source = 'onchain' AND ledger_ignore = false
                          AND block_number > $2
                    "#,
                    &[&position_id, &f],
                )
                .await?
        },
        None => {
            client
                .execute(
                    "DELETE FROM position_event WHERE position_id = $1 AND source = 'onchain' AND ledger_ignore = false",
                    &[&position_id],
                )
                .await?
        },
    };
    Ok(count)
}

/// Writes one processed event's snapshot. Keyed by
/// `(position_id, input_hash)`: a freshly computed on-chain row always inserts
/// (its stale predecessor was already deleted); a manual or ignored row whose
/// surrounding state shifted gets its derived/snapshot columns overwritten in
/// place, preserving its original row identity and `input_hash`.
pub async fn upsert_position_event<C: GenericClient>(client: &C, event: &PositionEvent) -> anyhow::Result<()> {
    client
        .execute(
            r#"
            INSERT INTO position_event (
                id, position_id, source, ledger_ignore, event_type, block_number,
                transaction_index, log_index, block_timestamp, transaction_hash,
                delta_l, token0_amount, token1_amount, pool_sqrt_price_x96,
                liquidity_after, cost_basis_after, realized_pnl_after,
                uncollected_principal_0, uncollected_principal_1,
                delta_cost_basis, delta_pnl, fee_value_in_quote, token_value_in_quote,
                input_hash, calc_version
            ) VALUES (
                $1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25
            )
            ON CONFLICT (position_id, input_hash) DO UPDATE SET
                ledger_ignore = EXCLUDED.ledger_ignore,
                block_timestamp = EXCLUDED.block_timestamp,
                liquidity_after = EXCLUDED.liquidity_after,
                cost_basis_after = EXCLUDED.cost_basis_after,
                realized_pnl_after = EXCLUDED.realized_pnl_after,
                uncollected_principal_0 = EXCLUDED.uncollected_principal_0,
                uncollected_principal_1 = EXCLUDED.uncollected_principal_1,
                delta_cost_basis = EXCLUDED.delta_cost_basis,
                delta_pnl = EXCLUDED.delta_pnl,
                fee_value_in_quote = EXCLUDED.fee_value_in_quote,
                token_value_in_quote = EXCLUDED.token_value_in_quote,
                calc_version = EXCLUDED.calc_version
            "#,
            &[
                &event.id,
                &event.position_id,
                &event.source.as_str(),
                &event.ledger_ignore,
                &event.event_type.as_str(),
                &event.block_number,
                &event.transaction_index,
                &event.log_index,
                &event.block_timestamp,
                &event.transaction_hash,
                &event.delta_l,
                &event.token0_amount,
                &event.token1_amount,
                &event.pool_sqrt_price_x96,
                &event.liquidity_after,
                &event.cost_basis_after,
                &event.realized_pnl_after,
                &event.uncollected_principal_0,
                &event.uncollected_principal_1,
                &event.delta_cost_basis,
                &event.delta_pnl,
                &event.fee_value_in_quote,
                &event.token_value_in_quote,
                &event.input_hash,
                &event.calc_version,
            ],
        )
        .await?;
    Ok(())
}

/// Administrative `hard_reset`: deletes every ledger row for a position.
pub async fn hard_reset_ledger<C: GenericClient>(client: &C, position_id: Uuid) -> anyhow::Result<u64> {
    Ok(client
        .execute("DELETE FROM position_event WHERE position_id = $1", &[&position_id])
        .await?)
}

/// The lowest unused negative `log_index` for a `(position, block)` pair, for
/// assigning the next manual event per invariant 6.
pub async fn next_manual_log_index<C: GenericClient>(
    client: &C,
    position_id: Uuid,
    block_number: i64,
) -> anyhow::Result<i32> {
    let row = client
        .query_one(
            r#"
            SELECT COALESCE(MIN(log_index), 0) AS min_log_index
            FROM position_event
            WHERE position_id = $1 AND block_number = $2 AND transaction_index = -1
            "#,
            &[&position_id, &block_number],
        )
        .await?;
    let min_log_index: i32 = row.get("min_log_index");
    Ok(if min_log_index == 0 { -1 } else { min_log_index - 1 })
}

pub async fn input_hash_exists<C: GenericClient>(
    client: &C,
    position_id: Uuid,
    input_hash: &str,
) -> anyhow::Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM position_event WHERE position_id = $1 AND input_hash = $2) AS exists",
            &[&position_id, &input_hash],
        )
        .await?;
    Ok(row.get("exists"))
}

// ==================== POOL PRICE CACHE ====================

impl PostgresClient {
    pub async fn get_pool_price(
        &self,
        chain: &str,
        pool_address: &str,
        block_number: i64,
    ) -> anyhow::Result<Option<PoolPriceCacheEntry>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT chain, pool_address, block_number, sqrt_price_x96, tick, block_timestamp
                FROM pool_price_cache WHERE chain = $1 AND pool_address = $2 AND block_number = $3
                "#,
                &[&chain, &pool_address, &block_number],
            )
            .await?;
        Ok(row.map(|row| PoolPriceCacheEntry {
            chain: row.get("chain"),
            pool_address: row.get("pool_address"),
            block_number: row.get("block_number"),
            sqrt_price_x96: row.get("sqrt_price_x96"),
            tick: row.get("tick"),
            block_timestamp: row.get("block_timestamp"),
        }))
    }

    pub async fn upsert_pool_price(&self, entry: &PoolPriceCacheEntry) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO pool_price_cache (chain, pool_address, block_number, sqrt_price_x96, tick, block_timestamp)
                VALUES ($1,$2,$3,$4,$5,$6)
                ON CONFLICT (chain, pool_address, block_number) DO NOTHING
                "#,
                &[
                    &entry.chain,
                    &entry.pool_address,
                    &entry.block_number,
                    &entry.sqrt_price_x96,
                    &entry.tick,
                    &entry.block_timestamp,
                ],
            )
            .await?;
        Ok(())
    }

    /// Drops cached `slot0` reads above a chain's finality boundary: a
    /// reorg could have replaced the block at that height, so a non-final
    /// entry is never trustworthy for more than one polling interval.
    pub async fn delete_non_final_price_cache(&self, chain: &str, boundary: i64) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        Ok(client
            .execute(
                "DELETE FROM pool_price_cache WHERE chain = $1 AND block_number > $2",
                &[&chain, &boundary],
            )
            .await?)
    }
}

// ==================== POSITION PNL ====================

impl PostgresClient {
    pub async fn get_position_pnl(&self, position_id: Uuid) -> anyhow::Result<Option<PositionPnl>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT position_id, current_value, current_cost_basis, realized_pnl,
                       collected_fees, unclaimed_fees, unrealized_pnl, total_pnl,
                       calc_version, computed_at
                FROM position_pnl WHERE position_id = $1
                "#,
                &[&position_id],
            )
            .await?;
        Ok(row.map(|row| PositionPnl {
            position_id: row.get("position_id"),
            current_value: row.get("current_value"),
            current_cost_basis: row.get("current_cost_basis"),
            realized_pnl: row.get("realized_pnl"),
            collected_fees: row.get("collected_fees"),
            unclaimed_fees: row.get("unclaimed_fees"),
            unrealized_pnl: row.get("unrealized_pnl"),
            total_pnl: row.get("total_pnl"),
            calc_version: row.get("calc_version"),
            computed_at: row.get("computed_at"),
        }))
    }

    pub async fn upsert_position_pnl(&self, pnl: &PositionPnl) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO position_pnl (
                    position_id, current_value, current_cost_basis, realized_pnl,
                    collected_fees, unclaimed_fees, unrealized_pnl, total_pnl,
                    calc_version, computed_at
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
                ON CONFLICT (position_id) DO UPDATE SET
                    current_value = EXCLUDED.current_value,
                    current_cost_basis = EXCLUDED.current_cost_basis,
                    realized_pnl = EXCLUDED.realized_pnl,
                    collected_fees = EXCLUDED.collected_fees,
                    unclaimed_fees = EXCLUDED.unclaimed_fees,
                    unrealized_pnl = EXCLUDED.unrealized_pnl,
                    total_pnl = EXCLUDED.total_pnl,
                    calc_version = EXCLUDED.calc_version,
                    computed_at = EXCLUDED.computed_at
                "#,
                &[
                    &pnl.position_id,
                    &pnl.current_value,
                    &pnl.current_cost_basis,
                    &pnl.realized_pnl,
                    &pnl.collected_fees,
                    &pnl.unclaimed_fees,
                    &pnl.unrealized_pnl,
                    &pnl.total_pnl,
                    &pnl.calc_version,
                    &pnl.computed_at,
                ],
            )
            .await?;
        Ok(())
    }
}

// ==================== POSITION CURVE ====================

impl PostgresClient {
    pub async fn get_position_curve(&self, position_id: Uuid) -> anyhow::Result<Option<PositionCurve>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT position_id, points_json, pool_tick, pool_sqrt_price_x96,
                       pnl_cache_version, is_valid, computed_at
                FROM position_curve WHERE position_id = $1
                "#,
                &[&position_id],
            )
            .await?;
        row.map(|row| -> anyhow::Result<PositionCurve> {
            let points_json: String = row.get("points_json");
            let points: Vec<CurvePoint> = serde_json::from_str(&points_json)?;
            Ok(PositionCurve {
                position_id: row.get("position_id"),
                points,
                pool_tick: row.get("pool_tick"),
                pool_sqrt_price_x96: row.get("pool_sqrt_price_x96"),
                pnl_cache_version: row.get("pnl_cache_version"),
                is_valid: row.get("is_valid"),
                computed_at: row.get("computed_at"),
            })
        })
        .transpose()
    }

    pub async fn upsert_position_curve(&self, curve: &PositionCurve) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let points_json = serde_json::to_string(&curve.points)?;
        client
            .execute(
                r#"
                INSERT INTO position_curve (
                    position_id, points_json, pool_tick, pool_sqrt_price_x96,
                    pnl_cache_version, is_valid, computed_at
                ) VALUES ($1,$2,$3,$4,$5,$6,$7)
                ON CONFLICT (position_id) DO UPDATE SET
                    points_json = EXCLUDED.points_json,
                    pool_tick = EXCLUDED.pool_tick,
                    pool_sqrt_price_x96 = EXCLUDED.pool_sqrt_price_x96,
                    pnl_cache_version = EXCLUDED.pnl_cache_version,
                    is_valid = EXCLUDED.is_valid,
                    computed_at = EXCLUDED.computed_at
                "#,
                &[
                    &curve.position_id,
                    &points_json,
                    &curve.pool_tick,
                    &curve.pool_sqrt_price_x96,
                    &curve.pnl_cache_version,
                    &curve.is_valid,
                    &curve.computed_at,
                ],
            )
            .await?;
        Ok(())
    }

    /// Marks a position's curve stale without recomputing it: any change to
    /// the cost-basis-bearing PnL cache entry invalidates the curve.
    pub async fn invalidate_position_curve(&self, position_id: Uuid) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE position_curve SET is_valid = false WHERE position_id = $1",
                &[&position_id],
            )
            .await?;
        Ok(())
    }
}
