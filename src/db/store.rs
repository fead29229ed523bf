use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{Pool, PoolTick, Tick, Token};

/// A relational store that can open write transactions.
#[async_trait]
pub trait PoolStore: Send + Sync {
    type Transaction: StoreTransaction;

    async fn begin(&self) -> Result<Self::Transaction>;
}

/// Writes staged inside one transaction.
///
/// Nothing is visible to other readers until [`StoreTransaction::commit`].
/// Dropping a transaction without finishing it discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts the token unless a row with the same id exists.
    async fn insert_token(&mut self, token: &Token) -> Result<()>;

    async fn upsert_tick(&mut self, tick: &Tick) -> Result<()>;

    /// Inserts or updates the pool row. Token rows must already exist.
    async fn upsert_pool(&mut self, pool: &Pool) -> Result<()>;

    /// Links a tick to its pool; an existing link is left untouched.
    async fn insert_pool_tick(&mut self, pool_tick: &PoolTick) -> Result<()>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
