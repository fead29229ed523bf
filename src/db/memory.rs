//! In-memory [`PoolStore`] for tests, with the same keys and foreign keys as
//! `schema/postgres.sql`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use num_bigint::BigUint;

use crate::db::models::{Pool, PoolTick, Tick, Token};
use crate::db::store::{PoolStore, StoreTransaction};

#[derive(Debug, Clone, PartialEq)]
pub struct PoolRow {
    pub fee_tier: i32,
    pub sqrt_price: BigUint,
    pub liquidity: BigUint,
    pub token0_id: String,
    pub token1_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub tokens: BTreeMap<String, Token>,
    pub ticks: BTreeMap<String, Tick>,
    pub pools: BTreeMap<String, PoolRow>,
    pub pool_ticks: BTreeSet<PoolTick>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    committed: Arc<Mutex<Tables>>,
    /// Tick id whose upsert fails, to exercise rollback
    fail_on_tick: Option<String>,
    transactions: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn failing_on_tick(tick_id: &str) -> Self {
        Self {
            fail_on_tick: Some(tick_id.to_string()),
            ..Default::default()
        }
    }

    pub fn tables(&self) -> Tables {
        self.committed.lock().unwrap().clone()
    }

    /// Number of transactions begun so far.
    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

pub struct MemoryTransaction {
    committed: Arc<Mutex<Tables>>,
    staged: Tables,
    fail_on_tick: Option<String>,
}

#[async_trait]
impl PoolStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTransaction {
            committed: self.committed.clone(),
            staged: self.tables(),
            fail_on_tick: self.fail_on_tick.clone(),
        })
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_token(&mut self, token: &Token) -> Result<()> {
        self.staged
            .tokens
            .entry(token.id.clone())
            .or_insert_with(|| token.clone());
        Ok(())
    }

    async fn upsert_tick(&mut self, tick: &Tick) -> Result<()> {
        if self.fail_on_tick.as_deref() == Some(tick.id.as_str()) {
            bail!("simulated failure writing tick {}", tick.id);
        }
        self.staged.ticks.insert(tick.id.clone(), tick.clone());
        Ok(())
    }

    async fn upsert_pool(&mut self, pool: &Pool) -> Result<()> {
        for token in [&pool.token0, &pool.token1] {
            if !self.staged.tokens.contains_key(&token.id) {
                bail!("pool {} references missing token {}", pool.id, token.id);
            }
        }

        self.staged.pools.insert(
            pool.id.clone(),
            PoolRow {
                fee_tier: pool.fee_tier,
                sqrt_price: pool.sqrt_price.clone(),
                liquidity: pool.liquidity.clone(),
                token0_id: pool.token0.id.clone(),
                token1_id: pool.token1.id.clone(),
            },
        );
        Ok(())
    }

    async fn insert_pool_tick(&mut self, pool_tick: &PoolTick) -> Result<()> {
        if !self.staged.pools.contains_key(&pool_tick.pool_id) {
            return Err(anyhow!("pool_tick references missing pool {}", pool_tick.pool_id));
        }
        if !self.staged.ticks.contains_key(&pool_tick.tick_id) {
            return Err(anyhow!("pool_tick references missing tick {}", pool_tick.tick_id));
        }

        self.staged.pool_ticks.insert(pool_tick.clone());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        *self.committed.lock().unwrap() = self.staged;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
