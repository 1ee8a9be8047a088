//! Background scheduling: the cron-driven job set that keeps cached
//! state fresh between explicit `sync` calls.

mod scheduler;

pub use scheduler::{CronScheduler, CronSettings};
