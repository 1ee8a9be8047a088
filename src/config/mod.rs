mod settings;

pub use settings::{ChainSettings, FinalityPolicy, PostgresSettings, SchedulerSettings, Settings};
