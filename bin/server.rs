//! Composition-root binary: load settings, stand up storage and the chain
//! registry, build the `Services` struct, register the background job set,
//! then run until SIGINT/SIGTERM. Shape: load config -> construct
//! provider/db -> run, with a cancellation-token-driven shutdown.

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use ledgerd::chain::ChainRegistry;
use ledgerd::{CronScheduler, Database, Services, Settings};
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

fn init_logging(level: &Option<String>) {
    let filter = level
        .as_deref()
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    if let Err(err) = SimpleLogger::new().with_level(filter).init() {
        eprintln!("logger setup failed: {err}");
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("ledgerd exited with error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::new().context("loading configuration from config.yaml")?;
    init_logging(&settings.log_level);

    info!("starting ledgerd for protocol {} across {} chain(s)", settings.protocol, settings.chains.len());

    let db = Database::new(&settings.postgres).await.context("connecting to PostgreSQL / running migrations")?;
    let chains = Arc::new(ChainRegistry::from_settings(&settings.chains).context("building chain registry")?);

    let services = Arc::new(Services::new(db, chains, settings.protocol.clone()));
    let cron = CronScheduler::new(services.clone(), settings.scheduler.clone());

    let cancellation_token = CancellationToken::new();
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, cancelling background tasks");
        shutdown_token.cancel();
    });

    cron.run(cancellation_token).await.context("running cron scheduler")?;

    info!("ledgerd shut down cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
