use config::{Config, ConfigError, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// The sole durable store: positions, their event ledgers, pool/token metadata,
/// the price cache, and derived PnL/curve caches all live here so that a `sync`
/// can be a single transaction.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Finality policy for a chain.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalityPolicy {
    BlockTag,
    Confirmations { blocks: u64 },
}

/// Per-chain configuration: RPC/explorer endpoints, well-known contract addresses,
/// and the finality policy used by the Block Info Service. Centralizing this here
/// (rather than scattering confirmation counts through call sites) resolves
/// Open Question #3.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub chain: String,
    pub chain_id: u64,
    pub rpc_url: String,
    #[serde(default)]
    pub explorer_base_url: Option<String>,
    #[serde(default)]
    pub explorer_api_key_env: Option<String>,
    pub wrapped_native_address: String,
    pub factory_address: String,
    pub position_manager_address: String,
    pub finality: FinalityPolicy,
    #[serde(default = "default_min_request_spacing_ms")]
    pub min_request_spacing_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_min_request_spacing_ms() -> u64 {
    200
}

fn default_max_in_flight() -> usize {
    8
}

/// Cadence of the background job set.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerSettings {
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_curve_regen_interval_secs")]
    pub curve_regen_interval_secs: u64,
    #[serde(default = "default_price_cache_prune_interval_secs")]
    pub price_cache_prune_interval_secs: u64,
}

fn default_resync_interval_secs() -> u64 {
    300
}

fn default_curve_regen_interval_secs() -> u64 {
    600
}

fn default_price_cache_prune_interval_secs() -> u64 {
    3600
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval_secs(),
            curve_regen_interval_secs: default_curve_regen_interval_secs(),
            price_cache_prune_interval_secs: default_price_cache_prune_interval_secs(),
        }
    }
}

/// Root application configuration, loaded from `config.yaml` at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chains: Vec<ChainSettings>,
    /// Protocol label baked into every position's composite identity
    /// `(user_id, chain, protocol, nft_id)`. One running `ledgerd`
    /// serves one protocol.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_protocol() -> String {
    "uniswap-v3".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        s.try_deserialize()
    }
}
