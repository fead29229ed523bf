//! Cron scheduler for the periodic pool sync.
//!
//! One repeated job drives [`SyncOrchestrator::run_once`]. Runs never overlap:
//! a tick that fires while the previous run is still going is skipped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::SyncSettings;
use crate::db::PoolStore;
use crate::sync::{RunOutcome, SyncError, SyncOrchestrator};

use super::jobs;

/// Cron scheduler that owns the orchestrator between runs.
pub struct CronScheduler<S> {
    orchestrator: Arc<Mutex<SyncOrchestrator<S>>>,
    settings: Arc<CronSettings>,
}

/// Configuration for cron job intervals
#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Interval between pool syncs - default 30 minutes
    pub pool_sync_interval_secs: u64,
    /// Sync once right after startup instead of waiting a full interval
    pub run_on_start: bool,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            pool_sync_interval_secs: 1800, // 30 minutes
            run_on_start: true,
        }
    }
}

impl From<&SyncSettings> for CronSettings {
    fn from(sync: &SyncSettings) -> Self {
        Self {
            pool_sync_interval_secs: sync.interval_secs,
            ..Default::default()
        }
    }
}

impl<S: PoolStore + 'static> CronScheduler<S> {
    pub fn new(orchestrator: SyncOrchestrator<S>, settings: CronSettings) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_pool_sync_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started");

        if self.settings.run_on_start {
            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                run_exclusive(&orchestrator).await;
            });
        }

        // Wait for cancellation
        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_pool_sync_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let orchestrator = self.orchestrator.clone();
        let interval = self.settings.pool_sync_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                run_exclusive(&orchestrator).await;
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered {} job (every {}s)", jobs::pool_sync::JOB_NAME, interval);
        Ok(())
    }
}

/// Runs the sync unless another run holds the orchestrator. `None` means skipped.
async fn run_exclusive<S: PoolStore>(
    orchestrator: &Mutex<SyncOrchestrator<S>>,
) -> Option<Result<RunOutcome, SyncError>> {
    let Ok(orchestrator) = orchestrator.try_lock() else {
        warn!(
            "Previous {} run still in progress, skipping this tick",
            jobs::pool_sync::JOB_NAME
        );
        return None;
    };

    Some(jobs::pool_sync::run(&orchestrator).await)
}
