//! Event Fetcher: pulls `IncreaseLiquidity`/`DecreaseLiquidity`/`Collect`
//! logs for one position NFT, filtered by its token id in topic1. Grounded on
//! `abis/position_manager.rs`'s `sol!` event declarations and the
//! `SolEvent::decode_log` idiom used throughout the retrieval pack's
//! Uniswap-v3-adjacent log decoders (e.g. the pool-event decoders in
//! `arbrs`/`angstrom`/`amms-rs`), narrowed here to the position manager's
//! three lifecycle events and a single token id's topic1 filter.
//!
//! Stateless: every call re-fetches `[from_block, to_block]` from the chain,
//! decodes, de-duplicates by `(transaction_hash, log_index)`, and returns the
//! merged result sorted by `(block_number, transaction_index, log_index)`.
//! No state is kept between calls.

use std::collections::HashMap;

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};

use crate::abis::position_manager::{Collect, DecreaseLiquidity, IncreaseLiquidity};
use crate::chain::{BlockTag, ChainClient};
use crate::db::models::EventType;

/// `keccak256("IncreaseLiquidity(uint256,uint128,uint256,uint256)")`.
pub const INCREASE_LIQUIDITY_TOPIC: B256 = B256::new([
    0x30, 0x67, 0x04, 0x8b, 0xee, 0xe3, 0x1b, 0x25, 0xb2, 0xf1, 0x68, 0x1f, 0x88, 0xda, 0xc8, 0x38,
    0xc8, 0xbb, 0xa3, 0x6a, 0xf2, 0x5b, 0xfb, 0x2b, 0x7c, 0xf7, 0x47, 0x3a, 0x58, 0x47, 0xe3, 0x5f,
]);

/// `keccak256("DecreaseLiquidity(uint256,uint128,uint256,uint256)")`.
pub const DECREASE_LIQUIDITY_TOPIC: B256 = B256::new([
    0x26, 0xf6, 0xa0, 0x48, 0xee, 0x91, 0x38, 0xf2, 0xc0, 0xce, 0x26, 0x6f, 0x32, 0x2c, 0xb9, 0x92,
    0x28, 0xe8, 0xd6, 0x19, 0xae, 0x2b, 0xff, 0x30, 0xc6, 0x7f, 0x8d, 0xcf, 0x9d, 0x23, 0x77, 0xb4,
]);

/// `keccak256("Collect(uint256,address,uint256,uint256)")`.
pub const COLLECT_TOPIC: B256 = B256::new([
    0x40, 0xd0, 0xef, 0xd1, 0xa5, 0x3d, 0x60, 0xec, 0xbf, 0x40, 0x97, 0x1b, 0x9d, 0xaf, 0x7d, 0xc9,
    0x01, 0x78, 0xc3, 0xaa, 0xdc, 0x7a, 0xab, 0x17, 0x65, 0x63, 0x27, 0x38, 0xfa, 0x8b, 0x8f, 0x01,
]);

/// One decoded, block-timestamped on-chain lifecycle event, pre-ledger.
/// Carries enough to build a `PositionEvent` without re-touching the chain.
#[derive(Debug, Clone)]
pub struct RawPositionEvent {
    pub event_type: EventType,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
    pub block_timestamp: DateTime<Utc>,
    /// `IncreaseLiquidity`/`DecreaseLiquidity` only; zero for `Collect`.
    pub delta_liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
}

/// Left-pads a token id into the 32-byte topic alloy's log filter expects.
fn token_id_topic(token_id: U256) -> B256 {
    B256::from(token_id.to_be_bytes::<32>())
}

pub struct EventFetcher<'a, C: ChainClient> {
    client: &'a C,
    position_manager: Address,
}

impl<'a, C: ChainClient> EventFetcher<'a, C> {
    pub fn new(client: &'a C, position_manager: Address) -> Self {
        Self { client, position_manager }
    }

    /// Fetches and decodes all three event types for `token_id` over
    /// `[from_block, to_block]`, inclusive, returning them de-duplicated and
    /// ordered.
    pub async fn fetch(
        &self,
        token_id: U256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawPositionEvent>> {
        if from_block > to_block {
            return Ok(Vec::new());
        }
        let topic1 = token_id_topic(token_id);

        let increase_logs = self
            .client
            .get_logs(self.position_manager, INCREASE_LIQUIDITY_TOPIC, Some(topic1), from_block, to_block)
            .await
            .context("fetching IncreaseLiquidity logs")?;
        let decrease_logs = self
            .client
            .get_logs(self.position_manager, DECREASE_LIQUIDITY_TOPIC, Some(topic1), from_block, to_block)
            .await
            .context("fetching DecreaseLiquidity logs")?;
        let collect_logs = self
            .client
            .get_logs(self.position_manager, COLLECT_TOPIC, Some(topic1), from_block, to_block)
            .await
            .context("fetching Collect logs")?;

        let mut decoded = Vec::with_capacity(increase_logs.len() + decrease_logs.len() + collect_logs.len());
        for log in &increase_logs {
            let ev = IncreaseLiquidity::decode_log(&log.inner, true)
                .context("decoding IncreaseLiquidity log")?;
            decoded.push(partial_from_log(log, EventType::IncreaseLiquidity, ev.data.liquidity, ev.data.amount0, ev.data.amount1)?);
        }
        for log in &decrease_logs {
            let ev = DecreaseLiquidity::decode_log(&log.inner, true)
                .context("decoding DecreaseLiquidity log")?;
            decoded.push(partial_from_log(log, EventType::DecreaseLiquidity, ev.data.liquidity, ev.data.amount0, ev.data.amount1)?);
        }
        for log in &collect_logs {
            let ev = Collect::decode_log(&log.inner, true).context("decoding Collect log")?;
            decoded.push(partial_from_log(log, EventType::Collect, 0, ev.data.amount0, ev.data.amount1)?);
        }

        decoded.sort_by_key(|e| (e.block_number, e.transaction_index, e.log_index));
        decoded.dedup_by_key(|e| (e.transaction_hash, e.log_index));

        let unique_blocks: Vec<u64> = {
            let mut seen = HashMap::new();
            for e in &decoded {
                seen.entry(e.block_number).or_insert(());
            }
            seen.into_keys().collect()
        };
        let mut timestamps = HashMap::with_capacity(unique_blocks.len());
        for block_number in unique_blocks {
            let header = self
                .client
                .get_block(BlockTag::Number(block_number))
                .await
                .with_context(|| format!("fetching block header {block_number}"))?
                .with_context(|| format!("block {block_number} not found"))?;
            let ts = Utc
                .timestamp_opt(header.timestamp as i64, 0)
                .single()
                .with_context(|| format!("invalid block timestamp for block {block_number}"))?;
            timestamps.insert(block_number, ts);
        }
        for event in &mut decoded {
            event.block_timestamp = *timestamps
                .get(&event.block_number)
                .expect("timestamp fetched for every distinct block above");
        }

        Ok(decoded)
    }
}

fn partial_from_log(
    log: &alloy::rpc::types::Log,
    event_type: EventType,
    delta_liquidity: u128,
    amount0: U256,
    amount1: U256,
) -> Result<RawPositionEvent> {
    let block_number = log.block_number.context("log missing block_number")?;
    let transaction_index = log.transaction_index.context("log missing transaction_index")?;
    let log_index = log.log_index.context("log missing log_index")?;
    let transaction_hash = log.transaction_hash.context("log missing transaction_hash")?;
    Ok(RawPositionEvent {
        event_type,
        block_number,
        transaction_index,
        log_index,
        transaction_hash,
        block_timestamp: Utc.timestamp_opt(0, 0).single().expect("epoch is valid"),
        delta_liquidity,
        amount0,
        amount1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_topic_left_pads_small_ids() {
        let topic = token_id_topic(U256::from(42u64));
        assert_eq!(topic.as_slice()[..31], [0u8; 31]);
        assert_eq!(topic.as_slice()[31], 42u8);
    }

    #[test]
    fn canonical_topics_are_32_bytes() {
        assert_eq!(INCREASE_LIQUIDITY_TOPIC.as_slice().len(), 32);
        assert_eq!(DECREASE_LIQUIDITY_TOPIC.as_slice().len(), 32);
        assert_eq!(COLLECT_TOPIC.as_slice().len(), 32);
    }
}
