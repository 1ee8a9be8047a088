use std::sync::Arc;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Log, TransactionRequest};
use anyhow::{Context, Result};
use url::Url;

use super::client::{build_log_filter, logs_are_ordered, BlockHeader, BlockTag, ChainClient};
use super::scheduler::RequestScheduler;

/// `ChainClient` backed by a real JSON-RPC node, gated by a per-chain
/// `RequestScheduler`. Grounded on `TokenFetcher`'s `ProviderBuilder::new().connect_http(url)`
/// construction and `DynProvider` usage.
#[derive(Clone)]
pub struct AlloyChainClient {
    chain_name: String,
    provider: DynProvider,
    scheduler: Arc<RequestScheduler>,
}

impl AlloyChainClient {
    pub fn new(chain_name: String, rpc_url: &str, scheduler: Arc<RequestScheduler>) -> Result<Self> {
        let url = Url::parse(rpc_url).context("invalid RPC URL")?;
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));

        Ok(Self {
            chain_name,
            provider,
            scheduler,
        })
    }

    fn to_block_number_or_tag(tag: BlockTag) -> BlockNumberOrTag {
        match tag {
            BlockTag::Latest => BlockNumberOrTag::Latest,
            BlockTag::Finalized => BlockNumberOrTag::Finalized,
            BlockTag::Safe => BlockNumberOrTag::Safe,
            BlockTag::Number(n) => BlockNumberOrTag::Number(n),
        }
    }
}

impl ChainClient for AlloyChainClient {
    async fn get_block(&self, tag: BlockTag) -> Result<Option<BlockHeader>> {
        let number_or_tag = Self::to_block_number_or_tag(tag);
        let provider = self.provider.clone();

        let block = self
            .scheduler
            .execute(|| async {
                provider
                    .get_block_by_number(number_or_tag)
                    .await
                    .context("eth_getBlockByNumber failed")
            })
            .await
            .with_context(|| format!("fetching block {number_or_tag:?} on {}", self.chain_name))?;

        Ok(block.map(|b| BlockHeader {
            number: b.header.number,
            timestamp: b.header.timestamp,
            hash: b.header.hash,
            parent_hash: b.header.parent_hash,
        }))
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        topic1: Option<B256>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let filter = build_log_filter(address, topic0, topic1, from_block, to_block);
        let provider = self.provider.clone();

        let mut logs = self
            .scheduler
            .execute(|| {
                let filter = filter.clone();
                let provider = provider.clone();
                async move { provider.get_logs(&filter).await.context("eth_getLogs failed") }
            })
            .await
            .with_context(|| {
                format!(
                    "fetching logs for {address} topic0={topic0} on {}",
                    self.chain_name
                )
            })?;

        logs.sort_by_key(|l| (l.block_number, l.transaction_index, l.log_index));
        logs_are_ordered(&logs)?;
        Ok(logs)
    }

    async fn read_contract(
        &self,
        address: Address,
        calldata: Bytes,
        at_block: Option<u64>,
    ) -> Result<Bytes> {
        let block_id = at_block
            .map(|n| BlockId::Number(BlockNumberOrTag::Number(n)))
            .unwrap_or(BlockId::Number(BlockNumberOrTag::Latest));
        let provider = self.provider.clone();
        let tx = TransactionRequest::default()
            .with_to(address)
            .with_input(calldata.clone());

        self.scheduler
            .execute(|| {
                let provider = provider.clone();
                let tx = tx.clone();
                async move {
                    provider
                        .call(tx)
                        .block(block_id)
                        .await
                        .context("eth_call failed")
                }
            })
            .await
            .with_context(|| format!("calling {address} on {}", self.chain_name))
    }
}
