use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::db::{PoolStore, PoolWriter};
use crate::sync::{PoolReader, SyncError};

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Persisted { pool_id: String, ticks: usize },
    /// The reader does not know the pool; nothing was written.
    PoolNotFound { pool_id: String },
}

/// Reads one snapshot of the configured pool and persists it.
///
/// Holds no state between runs and never retries a whole run; the next
/// scheduled tick is the retry.
pub struct SyncOrchestrator<S> {
    pool_id: String,
    reader: Arc<dyn PoolReader>,
    writer: PoolWriter<S>,
    run_deadline: Duration,
}

impl<S: PoolStore> SyncOrchestrator<S> {
    pub fn new(
        pool_id: &str,
        reader: Arc<dyn PoolReader>,
        writer: PoolWriter<S>,
        run_deadline: Duration,
    ) -> Self {
        Self {
            pool_id: pool_id.to_lowercase(),
            reader,
            writer,
            run_deadline,
        }
    }

    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    /// Runs the pipeline once under the run deadline.
    ///
    /// A deadline that fires mid-write drops the open transaction, which
    /// rolls it back.
    pub async fn run_once(&self) -> Result<RunOutcome, SyncError> {
        match tokio::time::timeout(self.run_deadline, self.sync()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                pool_id: self.pool_id.clone(),
                after: self.run_deadline,
            }),
        }
    }

    async fn sync(&self) -> Result<RunOutcome, SyncError> {
        let found = self
            .reader
            .find_pool(&self.pool_id)
            .await
            .map_err(|e| SyncError::fetch(&self.pool_id, "find_pool", e))?;

        let Some(mut pool) = found else {
            info!(
                "Pool {} not found via {}, nothing to sync",
                self.pool_id,
                self.reader.name()
            );
            return Ok(RunOutcome::PoolNotFound {
                pool_id: self.pool_id.clone(),
            });
        };

        pool.ticks = self
            .reader
            .fetch_ticks(&pool)
            .await
            .map_err(|e| SyncError::fetch(&self.pool_id, "fetch_ticks", e))?;

        self.writer
            .persist(&pool)
            .await
            .map_err(|source| SyncError::Write {
                pool_id: self.pool_id.clone(),
                source,
            })?;

        Ok(RunOutcome::Persisted {
            pool_id: self.pool_id.clone(),
            ticks: pool.ticks.len(),
        })
    }
}
