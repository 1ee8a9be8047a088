//! Cron scheduler for the background job set:
//!
//! - a periodic re-sync sweep over active positions
//! - periodic curve-cache regeneration
//! - periodic pool-price cache pruning of non-final stale entries
//!
//! Each job is a `tokio_cron_scheduler::Job::new_repeated_async` closure
//! cloning an `Arc` handle, registered on one `JobScheduler`, shut down on
//! `CancellationToken` cancellation.

use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::block_info::BlockInfoService;
use crate::service::Services;

pub use crate::config::SchedulerSettings as CronSettings;

/// Cron scheduler that manages the periodic background jobs.
pub struct CronScheduler {
    services: Arc<Services>,
    settings: CronSettings,
}

impl CronScheduler {
    pub fn new(services: Arc<Services>, settings: CronSettings) -> Self {
        Self { services, settings }
    }

    /// Starts the cron scheduler and runs until `cancellation_token` fires.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_resync_job(&scheduler).await?;
        self.register_curve_regen_job(&scheduler).await?;
        self.register_price_cache_prune_job(&scheduler).await?;

        scheduler.start().await?;
        info!("cron scheduler started with 3 jobs");

        cancellation_token.cancelled().await;
        info!("cron scheduler shutting down");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_resync_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let services = self.services.clone();
        let interval = self.settings.resync_interval_secs;

        let job = Job::new_repeated_async(std::time::Duration::from_secs(interval), move |_uuid, _lock| {
            let services = services.clone();
            Box::pin(async move {
                if let Err(e) = run_resync_sweep(&services).await {
                    error!("resync sweep failed: {e:#}");
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("registered resync sweep job (every {interval}s)");
        Ok(())
    }

    async fn register_curve_regen_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let services = self.services.clone();
        let interval = self.settings.curve_regen_interval_secs;

        let job = Job::new_repeated_async(std::time::Duration::from_secs(interval), move |_uuid, _lock| {
            let services = services.clone();
            Box::pin(async move {
                if let Err(e) = run_curve_regen_sweep(&services).await {
                    error!("curve regen sweep failed: {e:#}");
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("registered curve regen sweep job (every {interval}s)");
        Ok(())
    }

    async fn register_price_cache_prune_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let services = self.services.clone();
        let interval = self.settings.price_cache_prune_interval_secs;

        let job = Job::new_repeated_async(std::time::Duration::from_secs(interval), move |_uuid, _lock| {
            let services = services.clone();
            Box::pin(async move {
                if let Err(e) = run_price_cache_prune(&services).await {
                    error!("price cache prune failed: {e:#}");
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("registered price cache prune job (every {interval}s)");
        Ok(())
    }
}

/// One pass of the resync sweep: re-syncs every active position's ledger and
/// rolls its PnL/curve caches forward, one position at a time so a single
/// stuck RPC call can't starve the rest.
async fn run_resync_sweep(services: &Services) -> Result<()> {
    let positions = services.active_positions().await?;
    info!("resync sweep: {} active positions", positions.len());

    for position in positions {
        let result = services.sync(position.user_id, &position.chain, &position.nft_id).await;
        if let Err(e) = result {
            warn!("resync sweep: position {} failed: {e:#}", position.id);
        }
    }
    Ok(())
}

/// One pass of the curve regen sweep: warms the curve cache for every active
/// position, relying on `Services::get_curve`'s own invalidity check to skip
/// positions whose cache is already current.
async fn run_curve_regen_sweep(services: &Services) -> Result<()> {
    let positions = services.active_positions().await?;
    info!("curve regen sweep: {} active positions", positions.len());

    for position in positions {
        if let Err(e) = services.get_curve(position.id).await {
            warn!("curve regen sweep: position {} failed: {e:#}", position.id);
        }
    }
    Ok(())
}

/// One pass of the price cache prune job: for each configured chain, drops
/// cached `slot0` rows above that chain's current finality boundary.
async fn run_price_cache_prune(services: &Services) -> Result<()> {
    for chain_handle in services.chains.chains() {
        let block_info = BlockInfoService::new(&*chain_handle.client, &chain_handle.settings.finality);
        let boundary = match block_info.last_finalized_block().await? {
            Some(boundary) => boundary,
            None => continue,
        };

        let deleted = services
            .db
            .postgres
            .delete_non_final_price_cache(&chain_handle.settings.chain, boundary as i64)
            .await?;
        if deleted > 0 {
            info!("pruned {deleted} non-final price cache rows for {}", chain_handle.settings.chain);
        }
    }
    Ok(())
}
