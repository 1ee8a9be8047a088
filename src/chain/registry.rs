use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};

use crate::config::ChainSettings;

use super::alloy_client::AlloyChainClient;
use super::scheduler::RequestScheduler;

/// One chain's resolved configuration plus its client and request scheduler.
/// Built once at startup from `Settings::chains` and shared across every task
/// that touches that chain: the scheduler is process-wide per chain.
#[derive(Clone)]
pub struct ChainHandle {
    pub settings: ChainSettings,
    pub client: Arc<AlloyChainClient>,
    pub scheduler: Arc<RequestScheduler>,
}

impl ChainHandle {
    pub fn wrapped_native_address(&self) -> Result<Address> {
        self.settings
            .wrapped_native_address
            .parse()
            .context("invalid wrapped_native_address in chain settings")
    }

    pub fn factory_address(&self) -> Result<Address> {
        self.settings
            .factory_address
            .parse()
            .context("invalid factory_address in chain settings")
    }

    pub fn position_manager_address(&self) -> Result<Address> {
        self.settings
            .position_manager_address
            .parse()
            .context("invalid position_manager_address in chain settings")
    }
}

/// Lookup table from chain name to its resolved client handle, built once
/// from configuration at process startup: a chain registry enumerates the
/// configured chains and builds one handle for each.
pub struct ChainRegistry {
    by_name: HashMap<String, ChainHandle>,
}

impl ChainRegistry {
    pub fn from_settings(chains: &[ChainSettings]) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(chains.len());

        for settings in chains {
            let scheduler = Arc::new(RequestScheduler::new(
                settings.min_request_spacing_ms,
                settings.max_in_flight,
            ));
            let client = Arc::new(AlloyChainClient::new(
                settings.chain.clone(),
                &settings.rpc_url,
                scheduler.clone(),
            )?);

            by_name.insert(
                settings.chain.clone(),
                ChainHandle {
                    settings: settings.clone(),
                    client,
                    scheduler,
                },
            );
        }

        Ok(Self { by_name })
    }

    pub fn get(&self, chain: &str) -> Result<&ChainHandle> {
        self.by_name
            .get(chain)
            .with_context(|| format!("unknown chain {chain} (not present in configuration)"))
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainHandle> {
        self.by_name.values()
    }
}
