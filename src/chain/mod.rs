//! Chain Client: stateless read access to one EVM chain, serialized
//! through a per-chain request scheduler.

mod alloy_client;
mod client;
mod registry;
mod scheduler;

pub use alloy_client::AlloyChainClient;
pub use client::{BlockHeader, BlockTag, ChainClient};
pub use registry::{ChainHandle, ChainRegistry};
pub use scheduler::{is_transient, RequestScheduler};
