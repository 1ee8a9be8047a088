pub mod abis;
pub mod block_info;
pub mod chain;
pub mod concurrency;
pub mod config;
pub mod cron;
pub mod curve;
pub mod db;
pub mod errors;
pub mod events;
pub mod importer;
pub mod ledger;
pub mod math;
pub mod pnl;
pub mod pricing;
pub mod quote;
pub mod service;

pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use db::Database;
pub use errors::LedgerError;
pub use service::Services;
