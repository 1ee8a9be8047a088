//! Pool Price Cache: memoizes `slot0` reads keyed by
//! `(chain, pool, block)`. Immutable once the block is final, so durable
//! storage never needs invalidation — only a prune job for stale non-final
//! rows. Grounded on `token_fetcher.rs`'s
//! `moka::future::Cache` idiom for the in-memory layer and on
//! `abis/pool.rs`'s `slot0Call` for the on-chain read.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use moka::future::Cache;

use crate::abis::pool::IUniswapV3Pool;
use crate::chain::{BlockTag, ChainClient};
use crate::db::models::PoolPriceCacheEntry;
use crate::db::postgres::PostgresClient;

/// In-memory key: distinct blocks across chains/pools never collide because
/// the tuple is the full identity, not just the block number.
type CacheKey = (String, String, u64);

#[derive(Debug, Clone, Copy)]
pub struct PoolPrice {
    pub sqrt_price_x96: alloy::primitives::U256,
    pub tick: i32,
    pub block_timestamp: DateTime<Utc>,
}

pub struct PoolPriceCache {
    memo: Cache<CacheKey, PoolPrice>,
    postgres: Arc<PostgresClient>,
}

impl PoolPriceCache {
    pub fn new(postgres: Arc<PostgresClient>) -> Self {
        let memo = Cache::builder()
            .max_capacity(50_000)
            .time_to_live(Duration::from_secs(6 * 3600))
            .build();
        Self { memo, postgres }
    }

    /// Resolves `slot0` for `(chain, pool, block)`, consulting the in-memory
    /// cache, then durable storage, then the chain itself, in that order.
    pub async fn get_sqrt_price_at<C: ChainClient>(
        &self,
        client: &C,
        chain: &str,
        pool: Address,
        block: u64,
    ) -> Result<PoolPrice> {
        let key = (chain.to_string(), format!("{pool:#x}"), block);
        if let Some(hit) = self.memo.get(&key).await {
            return Ok(hit);
        }

        if let Some(row) = self
            .postgres
            .get_pool_price(chain, &format!("{pool:#x}"), block as i64)
            .await?
        {
            let price = row_to_price(&row)?;
            self.memo.insert(key, price).await;
            return Ok(price);
        }

        let price = self.fetch_and_store(client, chain, pool, block).await?;
        self.memo.insert(key, price).await;
        Ok(price)
    }

    async fn fetch_and_store<C: ChainClient>(
        &self,
        client: &C,
        chain: &str,
        pool: Address,
        block: u64,
    ) -> Result<PoolPrice> {
        let calldata = IUniswapV3Pool::slot0Call {}.abi_encode();
        let raw = client
            .read_contract(pool, calldata.into(), Some(block))
            .await
            .with_context(|| format!("reading slot0 for {pool} at block {block}"))?;
        let decoded = IUniswapV3Pool::slot0Call::abi_decode_returns(&raw)
            .context("decoding slot0 return data")?;

        let header = client
            .get_block(BlockTag::Number(block))
            .await?
            .with_context(|| format!("block {block} not found on {chain}"))?;
        let block_timestamp = chrono::Utc
            .timestamp_opt(header.timestamp as i64, 0)
            .single()
            .with_context(|| format!("invalid timestamp for block {block}"))?;

        let price = PoolPrice {
            sqrt_price_x96: decoded.sqrtPriceX96,
            tick: decoded.tick.as_i32(),
            block_timestamp,
        };

        let entry = PoolPriceCacheEntry {
            chain: chain.to_string(),
            pool_address: format!("{pool:#x}"),
            block_number: block as i64,
            sqrt_price_x96: price.sqrt_price_x96.to_string(),
            tick: price.tick,
            block_timestamp: price.block_timestamp,
        };
        self.postgres.upsert_pool_price(&entry).await?;

        Ok(price)
    }

    /// Sequential read for several blocks on one pool, each call going
    /// through the single-block path above (and so through its cache tiers
    /// independently). Not a multicall round-trip: one RPC call per
    /// uncached block. Tolerates individual failures by skipping that block
    /// rather than failing the whole set; callers see only the blocks that
    /// succeeded.
    pub async fn get_sqrt_prices_at<C: ChainClient>(
        &self,
        client: &C,
        chain: &str,
        pool: Address,
        blocks: &[u64],
    ) -> Vec<(u64, Result<PoolPrice>)> {
        let mut out = Vec::with_capacity(blocks.len());
        for &block in blocks {
            let result = self.get_sqrt_price_at(client, chain, pool, block).await;
            out.push((block, result));
        }
        out
    }
}

fn row_to_price(row: &PoolPriceCacheEntry) -> Result<PoolPrice> {
    let sqrt_price_x96 = row
        .sqrt_price_x96
        .parse()
        .context("parsing cached sqrt_price_x96")?;
    Ok(PoolPrice { sqrt_price_x96, tick: row.tick, block_timestamp: row.block_timestamp })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_to_price_parses_decimal_sqrt_price() {
        let row = PoolPriceCacheEntry {
            chain: "ethereum".into(),
            pool_address: "0xabc".into(),
            block_number: 100,
            sqrt_price_x96: "79228162514264337593543950336".into(),
            tick: 0,
            block_timestamp: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
        };
        let price = row_to_price(&row).unwrap();
        assert_eq!(price.tick, 0);
        assert_eq!(
            price.sqrt_price_x96,
            alloy::primitives::U256::from(79_228_162_514_264_337_593_543_950_336u128)
        );
    }
}
