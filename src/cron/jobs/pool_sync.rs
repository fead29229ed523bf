//! Job to refresh the configured pool's snapshot.
//!
//! Reads pool state and ticks through the configured reader and writes them
//! to PostgreSQL in one transaction. A failed run leaves the previous
//! snapshot in place until the next tick.

use log::{error, info};

use crate::db::PoolStore;
use crate::sync::{RunOutcome, SyncError, SyncOrchestrator};

pub const JOB_NAME: &str = "pool_sync";

pub async fn run<S: PoolStore>(
    orchestrator: &SyncOrchestrator<S>,
) -> Result<RunOutcome, SyncError> {
    info!("Starting {} job for pool {}...", JOB_NAME, orchestrator.pool_id());

    let start = std::time::Instant::now();
    let result = orchestrator.run_once().await;

    match &result {
        Ok(RunOutcome::Persisted { pool_id, ticks }) => info!(
            "{} job completed in {:?}: pool {} persisted with {} ticks",
            JOB_NAME,
            start.elapsed(),
            pool_id,
            ticks
        ),
        Ok(RunOutcome::PoolNotFound { pool_id }) => info!(
            "{} job completed in {:?}: pool {} not found",
            JOB_NAME,
            start.elapsed(),
            pool_id
        ),
        Err(e) => error!(
            "{} job failed after {:?}: {}",
            JOB_NAME,
            start.elapsed(),
            error_chain(e)
        ),
    }

    result
}

/// `error: cause: cause...`, the same shape as anyhow's `{:#}`.
fn error_chain(e: &SyncError) -> String {
    anyhow::Chain::new(e)
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
