use anyhow::{Context, Result};
use log::{info, warn};

use crate::db::models::Pool;
use crate::db::store::{PoolStore, StoreTransaction};

/// Writes a pool snapshot (tokens, ticks, pool row, pool/tick links) in one
/// transaction.
///
/// Tokens are insert-only; ticks and the pool row are upserted; links are
/// insert-only. Persisting the same snapshot twice leaves the same rows as
/// persisting it once.
pub struct PoolWriter<S> {
    store: S,
}

impl<S: PoolStore> PoolWriter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn persist(&self, pool: &Pool) -> Result<()> {
        let mut tx = self
            .store
            .begin()
            .await
            .context("Failed to begin transaction")?;

        if let Err(e) = write_snapshot(&mut tx, pool).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback for pool {} failed: {:#}", pool.id, rollback_err);
            }
            return Err(e);
        }

        tx.commit().await.context("Failed to commit transaction")?;

        info!(
            "Persisted pool {} with {} ticks",
            pool.id,
            pool.ticks.len()
        );
        Ok(())
    }
}

/// Foreign keys dictate the order: tokens before the pool, ticks before links.
async fn write_snapshot<T: StoreTransaction>(tx: &mut T, pool: &Pool) -> Result<()> {
    for token in [&pool.token0, &pool.token1] {
        tx.insert_token(token)
            .await
            .with_context(|| format!("Failed to insert token {}", token.id))?;
    }

    for tick in &pool.ticks {
        tx.upsert_tick(tick)
            .await
            .with_context(|| format!("Failed to upsert tick {}", tick.id))?;
    }

    tx.upsert_pool(pool)
        .await
        .with_context(|| format!("Failed to upsert pool {}", pool.id))?;

    for pool_tick in pool.pool_ticks() {
        tx.insert_pool_tick(&pool_tick)
            .await
            .with_context(|| format!("Failed to link tick {}", pool_tick.tick_id))?;
    }

    Ok(())
}
