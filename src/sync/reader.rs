use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{Pool, Tick};

/// Source of pool snapshots. One implementation is selected per deployment.
#[async_trait]
pub trait PoolReader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Pool metadata with an empty tick set. `Ok(None)` means the source
    /// knows no pool with this id, which is not a failure.
    async fn find_pool(&self, id: &str) -> Result<Option<Pool>>;

    /// Current tick set of a pool previously returned by [`find_pool`](Self::find_pool).
    async fn fetch_ticks(&self, pool: &Pool) -> Result<Vec<Tick>>;
}
