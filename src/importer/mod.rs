//! Import/Lookup: the two operations that create or surface candidate
//! `Position` rows. Neither persists a `Position` on its own — `import_by_nft_id`
//! returns a fully-formed row the caller inserts via `db::postgres::upsert_position`,
//! and `discover_by_owner` returns unsaved summaries for the caller to filter.
//!
//! Grounded on `pnl/mod.rs`'s on-chain-read shape (build calldata, `read_contract`,
//! `abi_decode_returns`) and `quote::token0_is_quote` for the new row's frozen
//! quote-side flag.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::abis::erc20::IERC20;
use crate::abis::factory::IUniswapV3Factory;
use crate::abis::position_manager::INonfungiblePositionManager;
use crate::chain::{BlockTag, ChainClient};
use crate::db::models::{ImportType, Position, PositionStatus};
use crate::db::postgres::{get_position_by_identity, PostgresClient};
use crate::events::EventFetcher;
use crate::quote::{token0_is_quote, TokenRef};

/// A raw `positions(tokenId)` read, decoded but not yet turned into a `Position` row.
struct OnChainPosition {
    token0: Address,
    token1: Address,
    fee: u32,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
}

/// One not-yet-persisted candidate surfaced by `discover_by_owner`.
#[derive(Debug, Clone)]
pub struct DiscoveredPosition {
    pub nft_id: String,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: String,
    pub status: PositionStatus,
}

pub struct Importer {
    postgres: std::sync::Arc<PostgresClient>,
}

impl Importer {
    pub fn new(postgres: std::sync::Arc<PostgresClient>) -> Self {
        Self { postgres }
    }

    /// Import-by-NFT-id. Builds a complete, unsaved `Position` row for
    /// `token_id`; the caller is responsible for `upsert_position`.
    #[allow(clippy::too_many_arguments)]
    pub async fn import_by_nft_id<C: ChainClient>(
        &self,
        client: &C,
        chain: &str,
        protocol: &str,
        user_id: Uuid,
        position_manager: Address,
        factory: Address,
        wrapped_native_address: &str,
        token_id: U256,
    ) -> Result<Position> {
        let current_block = self
            .current_block_number(client)
            .await
            .context("reading current block for import")?;

        let (onchain, owner, as_of_block) = match self
            .read_positions_call(client, position_manager, token_id, None)
            .await
        {
            Ok(pos) => {
                let owner = self.read_owner_of(client, position_manager, token_id, None).await?;
                (pos, owner, current_block)
            }
            Err(_) => {
                // Token was burned (fully closed and the NFT redeemed); fall
                // back to the block of its most recent lifecycle event and
                // read historical state there.
                let fetcher = EventFetcher::new(client, position_manager);
                let history = fetcher.fetch(token_id, 0, current_block).await?;
                let last_block = history
                    .last()
                    .map(|e| e.block_number)
                    .context("position has no on-chain history and positions() reverted")?;
                let pos = self
                    .read_positions_call(client, position_manager, token_id, Some(last_block))
                    .await
                    .context("re-reading positions() at last known block")?;
                let owner = self
                    .read_owner_of(client, position_manager, token_id, Some(last_block))
                    .await
                    .context("reading ownerOf at last known block")?;
                (pos, owner, last_block)
            }
        };

        let pool_address = self
            .resolve_pool(client, factory, onchain.token0, onchain.token1, onchain.fee)
            .await?;

        let token0 = self.ensure_token(client, chain, onchain.token0).await?;
        let token1 = self.ensure_token(client, chain, onchain.token1).await?;

        let net_delta_l = self.net_delta_liquidity(client, position_manager, token_id, current_block).await?;
        let status = if net_delta_l > 0 { PositionStatus::Active } else { PositionStatus::Closed };
        let _ = as_of_block;

        let token0_addr_str = onchain.token0.to_string();
        let token1_addr_str = onchain.token1.to_string();
        let token0_ref = TokenRef { symbol: &token0.symbol, address: &token0_addr_str };
        let token1_ref = TokenRef { symbol: &token1.symbol, address: &token1_addr_str };

        let now = Utc::now();
        Ok(Position {
            id: Uuid::new_v4(),
            user_id,
            chain: chain.to_string(),
            protocol: protocol.to_string(),
            nft_id: token_id.to_string(),
            pool_chain: chain.to_string(),
            pool_address: format!("{pool_address:#x}"),
            tick_lower: onchain.tick_lower,
            tick_upper: onchain.tick_upper,
            liquidity: onchain.liquidity.to_string(),
            token0_is_quote: token0_is_quote(token0_ref, token1_ref, wrapped_native_address),
            owner: format!("{owner:#x}"),
            import_type: ImportType::Nft,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Discover-by-owner. Walks `tokenOfOwnerByIndex` from the newest
    /// NFT down, skipping ids already recorded for `(user_id, chain, protocol)`,
    /// and stops once `limit` new candidates have been summarized.
    pub async fn discover_by_owner<C: ChainClient>(
        &self,
        client: &C,
        chain: &str,
        protocol: &str,
        user_id: Uuid,
        position_manager: Address,
        owner: Address,
        limit: usize,
    ) -> Result<Vec<DiscoveredPosition>> {
        let balance = self.read_balance_of(client, position_manager, owner).await?;
        let mut discovered = Vec::new();

        let mut index = balance;
        while index > 0 && discovered.len() < limit {
            index -= 1;
            let token_id = self
                .read_token_of_owner_by_index(client, position_manager, owner, U256::from(index))
                .await?;

            let conn = self.postgres.pool.get().await?;
            let already_known =
                get_position_by_identity(&conn, user_id, chain, protocol, &token_id.to_string())
                    .await?
                    .is_some();
            drop(conn);
            if already_known {
                continue;
            }

            let onchain = self.read_positions_call(client, position_manager, token_id, None).await?;
            let token0 = self.ensure_token(client, chain, onchain.token0).await?;
            let token1 = self.ensure_token(client, chain, onchain.token1).await?;

            let status = if onchain.liquidity > 0 { PositionStatus::Active } else { PositionStatus::Closed };

            discovered.push(DiscoveredPosition {
                nft_id: token_id.to_string(),
                token0_symbol: token0.symbol,
                token1_symbol: token1.symbol,
                fee: onchain.fee,
                tick_lower: onchain.tick_lower,
                tick_upper: onchain.tick_upper,
                liquidity: onchain.liquidity.to_string(),
                status,
            });
        }

        Ok(discovered)
    }

    async fn current_block_number<C: ChainClient>(&self, client: &C) -> Result<u64> {
        let header = client
            .get_block(BlockTag::Latest)
            .await?
            .context("chain returned no header for the latest block")?;
        Ok(header.number)
    }

    async fn read_positions_call<C: ChainClient>(
        &self,
        client: &C,
        position_manager: Address,
        token_id: U256,
        at_block: Option<u64>,
    ) -> Result<OnChainPosition> {
        let calldata = INonfungiblePositionManager::positionsCall { tokenId: token_id }.abi_encode();
        let raw = client.read_contract(position_manager, calldata.into(), at_block).await?;
        let decoded = INonfungiblePositionManager::positionsCall::abi_decode_returns(&raw)
            .context("decoding positions()")?;
        Ok(OnChainPosition {
            token0: decoded.token0,
            token1: decoded.token1,
            fee: decoded.fee.to::<u32>(),
            tick_lower: decoded.tickLower.as_i32(),
            tick_upper: decoded.tickUpper.as_i32(),
            liquidity: decoded.liquidity,
        })
    }

    async fn read_owner_of<C: ChainClient>(
        &self,
        client: &C,
        position_manager: Address,
        token_id: U256,
        at_block: Option<u64>,
    ) -> Result<Address> {
        let calldata = INonfungiblePositionManager::ownerOfCall { tokenId: token_id }.abi_encode();
        let raw = client.read_contract(position_manager, calldata.into(), at_block).await?;
        INonfungiblePositionManager::ownerOfCall::abi_decode_returns(&raw).context("decoding ownerOf")
    }

    async fn read_balance_of<C: ChainClient>(&self, client: &C, position_manager: Address, owner: Address) -> Result<u64> {
        let calldata = INonfungiblePositionManager::balanceOfCall { owner }.abi_encode();
        let raw = client.read_contract(position_manager, calldata.into(), None).await?;
        let balance: U256 = INonfungiblePositionManager::balanceOfCall::abi_decode_returns(&raw)
            .context("decoding balanceOf")?;
        balance.try_into().context("owner holds more positions than fit in a u64 index")
    }

    async fn read_token_of_owner_by_index<C: ChainClient>(
        &self,
        client: &C,
        position_manager: Address,
        owner: Address,
        index: U256,
    ) -> Result<U256> {
        let calldata = INonfungiblePositionManager::tokenOfOwnerByIndexCall { owner, index }.abi_encode();
        let raw = client.read_contract(position_manager, calldata.into(), None).await?;
        INonfungiblePositionManager::tokenOfOwnerByIndexCall::abi_decode_returns(&raw)
            .context("decoding tokenOfOwnerByIndex")
    }

    async fn resolve_pool<C: ChainClient>(
        &self,
        client: &C,
        factory: Address,
        token0: Address,
        token1: Address,
        fee: u32,
    ) -> Result<Address> {
        let calldata = IUniswapV3Factory::getPoolCall { tokenA: token0, tokenB: token1, fee: fee.try_into()? }
            .abi_encode();
        let raw = client.read_contract(factory, calldata.into(), None).await?;
        IUniswapV3Factory::getPoolCall::abi_decode_returns(&raw).context("decoding getPool")
    }

    async fn ensure_token<C: ChainClient>(&self, client: &C, chain: &str, address: Address) -> Result<crate::db::models::Token> {
        let addr_str = format!("{address:#x}");
        if let Some(token) = self.postgres.get_token(chain, &addr_str).await? {
            return Ok(token);
        }

        let symbol_calldata = IERC20::symbolCall {}.abi_encode();
        let symbol_raw = client.read_contract(address, symbol_calldata.into(), None).await?;
        let symbol = IERC20::symbolCall::abi_decode_returns(&symbol_raw).context("decoding symbol")?;

        let name_calldata = IERC20::nameCall {}.abi_encode();
        let name_raw = client.read_contract(address, name_calldata.into(), None).await?;
        let name = IERC20::nameCall::abi_decode_returns(&name_raw).context("decoding name")?;

        let decimals_calldata = IERC20::decimalsCall {}.abi_encode();
        let decimals_raw = client.read_contract(address, decimals_calldata.into(), None).await?;
        let decimals = IERC20::decimalsCall::abi_decode_returns(&decimals_raw).context("decoding decimals")?;

        let token = crate::db::models::Token {
            chain: chain.to_string(),
            address: addr_str,
            symbol,
            name,
            decimals: decimals as i16,
            verified: false,
        };
        self.postgres.upsert_token(&token).await?;
        Ok(token)
    }

    async fn net_delta_liquidity<C: ChainClient>(
        &self,
        client: &C,
        position_manager: Address,
        token_id: U256,
        current_block: u64,
    ) -> Result<i128> {
        let fetcher = EventFetcher::new(client, position_manager);
        let history = fetcher.fetch(token_id, 0, current_block).await?;
        let mut net: i128 = 0;
        for event in history {
            match event.event_type {
                crate::db::models::EventType::IncreaseLiquidity => net += event.delta_liquidity as i128,
                crate::db::models::EventType::DecreaseLiquidity => net -= event.delta_liquidity as i128,
                crate::db::models::EventType::Collect => {}
            }
        }
        Ok(net)
    }
}
