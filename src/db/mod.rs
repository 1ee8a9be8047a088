use std::sync::Arc;

use crate::config::PostgresSettings;

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

/// The sole durable store. Positions, their event ledgers, pool/token
/// metadata, the price cache, and the derived PnL/curve caches all live in
/// one PostgreSQL database so that a `sync` can be a single ACID transaction.
/// A separate analytics store (ClickHouse or similar) would only earn its
/// keep for a high-throughput streaming indexer, which this isn't.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: &PostgresSettings) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.clone()).await?;
        postgres.migrate().await?;

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
