use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::{Filter, Log};
use anyhow::{Context, Result};

/// A block reference, as accepted by `get_block`. Not every chain supports
/// `Finalized`/`Safe` tags; callers must handle a `None` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Finalized,
    Safe,
    Number(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: u64,
    pub hash: B256,
    pub parent_hash: B256,
}

/// Capability set a chain must expose to every component above it: block
/// headers, event logs, and raw contract reads at a block. One implementation
/// (`AlloyChainClient`) talks to a real JSON-RPC node; tests inject a
/// hand-written fake implementing the same trait, so this stays a plain
/// generic-parameter trait rather than a `dyn`-dispatched one — nothing here
/// needs to be stored as a trait object.
pub trait ChainClient: Send + Sync {
    fn get_block(
        &self,
        tag: BlockTag,
    ) -> impl std::future::Future<Output = Result<Option<BlockHeader>>> + Send;

    fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        topic1: Option<B256>,
        from_block: u64,
        to_block: u64,
    ) -> impl std::future::Future<Output = Result<Vec<Log>>> + Send;

    fn read_contract(
        &self,
        address: Address,
        calldata: Bytes,
        at_block: Option<u64>,
    ) -> impl std::future::Future<Output = Result<Bytes>> + Send;
}

pub(super) fn build_log_filter(
    address: Address,
    topic0: B256,
    topic1: Option<B256>,
    from_block: u64,
    to_block: u64,
) -> Filter {
    let mut filter = Filter::new()
        .address(address)
        .from_block(from_block)
        .to_block(to_block)
        .event_signature(topic0);

    if let Some(topic1) = topic1 {
        filter = filter.topic1(topic1);
    }

    filter
}

pub(super) fn logs_are_ordered(logs: &[Log]) -> Result<()> {
    for window in logs.windows(2) {
        let a = &window[0];
        let b = &window[1];
        let a_key = (a.block_number, a.transaction_index, a.log_index);
        let b_key = (b.block_number, b.transaction_index, b.log_index);
        if a_key > b_key {
            return Err(anyhow::anyhow!("chain client returned unordered logs"))
                .context("expected logs sorted by (block, tx_index, log_index)");
        }
    }
    Ok(())
}
