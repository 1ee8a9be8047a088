//! Block Info Service: timestamp-to-block mapping and finality reporting,
//! pulled out as its own injectable interface rather than folded into a
//! chain worker's checkpoint tracking, since the Ledger Engine depends on it
//! directly.

use anyhow::{Context, Result};

use crate::chain::{BlockHeader, BlockTag, ChainClient};
use crate::config::FinalityPolicy;

/// `block_at_or_before`/`last_finalized_block`/`is_final`, generic over any
/// `ChainClient` so tests can inject a fake chain with a handful of blocks.
pub struct BlockInfoService<'a, C: ChainClient> {
    client: &'a C,
    finality: &'a FinalityPolicy,
}

impl<'a, C: ChainClient> BlockInfoService<'a, C> {
    pub fn new(client: &'a C, finality: &'a FinalityPolicy) -> Self {
        Self { client, finality }
    }

    /// The highest block regarded as irreversible right now, per the chain's
    /// configured finality policy. `None` if the chain has not produced one
    /// yet (e.g. a fresh confirmations-based chain below its confirmation
    /// depth).
    pub async fn last_finalized_block(&self) -> Result<Option<u64>> {
        match self.finality {
            FinalityPolicy::BlockTag => {
                let header = self.client.get_block(BlockTag::Finalized).await?;
                Ok(header.map(|h| h.number))
            },
            FinalityPolicy::Confirmations { blocks } => {
                let latest = self
                    .client
                    .get_block(BlockTag::Latest)
                    .await?
                    .context("chain returned no latest block")?;
                Ok(latest.number.checked_sub(*blocks))
            },
        }
    }

    /// `b ≤ last_finalized_block`. A chain with no finality boundary yet
    /// treats nothing as final.
    pub async fn is_final(&self, block: u64) -> Result<bool> {
        Ok(match self.last_finalized_block().await? {
            Some(f) => block <= f,
            None => false,
        })
    }

    /// The highest block number whose timestamp is `<= ts`, found by binary
    /// search against `latest` — this avoids depending on the explorer API's
    /// `block.getblocknobytime` action (an optional external collaborator)
    /// for a correctness-critical lookup.
    pub async fn block_at_or_before(&self, ts: u64) -> Result<u64> {
        let latest = self
            .client
            .get_block(BlockTag::Latest)
            .await?
            .context("chain returned no latest block")?;

        if ts >= latest.timestamp {
            return Ok(latest.number);
        }

        let genesis = self
            .client
            .get_block(BlockTag::Number(0))
            .await?
            .context("chain returned no genesis block")?;

        if ts <= genesis.timestamp {
            return Ok(genesis.number);
        }

        let mut low = genesis.number;
        let mut high = latest.number;
        // Invariant: block(low).timestamp <= ts < block(high + 1).timestamp,
        // with `high` always a candidate answer.
        while low < high {
            let mid = low + (high - low + 1) / 2;
            let header = self.block_header_at(mid).await?;
            if header.timestamp <= ts {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        Ok(low)
    }

    async fn block_header_at(&self, number: u64) -> Result<BlockHeader> {
        self.client
            .get_block(BlockTag::Number(number))
            .await?
            .with_context(|| format!("chain returned no block at height {number}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, B256};
    use alloy::rpc::types::Log;
    use std::future::Future;

    struct FakeChain {
        blocks: Vec<BlockHeader>,
    }

    impl ChainClient for FakeChain {
        fn get_block(
            &self,
            tag: BlockTag,
        ) -> impl Future<Output = Result<Option<BlockHeader>>> + Send {
            let result = match tag {
                BlockTag::Latest => self.blocks.last().copied(),
                BlockTag::Finalized => {
                    let n = self.blocks.len();
                    if n >= 3 {
                        self.blocks.get(n - 3).copied()
                    } else {
                        None
                    }
                },
                BlockTag::Safe => None,
                BlockTag::Number(n) => self.blocks.iter().find(|b| b.number == n).copied(),
            };
            async move { Ok(result) }
        }

        fn get_logs(
            &self,
            _address: Address,
            _topic0: B256,
            _topic1: Option<B256>,
            _from_block: u64,
            _to_block: u64,
        ) -> impl Future<Output = Result<Vec<Log>>> + Send {
            async move { Ok(Vec::new()) }
        }

        fn read_contract(
            &self,
            _address: Address,
            _calldata: Bytes,
            _at_block: Option<u64>,
        ) -> impl Future<Output = Result<Bytes>> + Send {
            async move { Ok(Bytes::new()) }
        }
    }

    fn header(number: u64, timestamp: u64) -> BlockHeader {
        BlockHeader {
            number,
            timestamp,
            hash: B256::ZERO,
            parent_hash: B256::ZERO,
        }
    }

    fn fake_chain() -> FakeChain {
        FakeChain {
            blocks: (0..10).map(|n| header(n, n * 12)).collect(),
        }
    }

    #[tokio::test]
    async fn finds_exact_block_for_exact_timestamp() {
        let chain = fake_chain();
        let policy = FinalityPolicy::Confirmations { blocks: 2 };
        let service = BlockInfoService::new(&chain, &policy);
        assert_eq!(service.block_at_or_before(60).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn finds_nearest_earlier_block_for_inexact_timestamp() {
        let chain = fake_chain();
        let policy = FinalityPolicy::Confirmations { blocks: 2 };
        let service = BlockInfoService::new(&chain, &policy);
        assert_eq!(service.block_at_or_before(65).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn confirmations_policy_computes_finalized_block() {
        let chain = fake_chain();
        let policy = FinalityPolicy::Confirmations { blocks: 2 };
        let service = BlockInfoService::new(&chain, &policy);
        assert_eq!(service.last_finalized_block().await.unwrap(), Some(7));
        assert!(service.is_final(7).await.unwrap());
        assert!(!service.is_final(8).await.unwrap());
    }

    #[tokio::test]
    async fn block_tag_policy_uses_finalized_tag() {
        let chain = fake_chain();
        let policy = FinalityPolicy::BlockTag;
        let service = BlockInfoService::new(&chain, &policy);
        assert_eq!(service.last_finalized_block().await.unwrap(), Some(6));
    }
}
