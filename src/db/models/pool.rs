use num_bigint::BigUint;

use crate::db::models::{Tick, Token};

/// Snapshot of a Uniswap V3 pool as produced by a reader (PostgreSQL `pool` table)
///
/// Primary Key: id (pool address)
/// `sqrt_price` and `liquidity` stay arbitrary precision until they are bound
/// into `NUMERIC` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub id: String,
    pub fee_tier: i32,
    pub sqrt_price: BigUint,
    pub liquidity: BigUint,
    pub token0: Token,
    pub token1: Token,
    pub ticks: Vec<Tick>,
}

impl Pool {
    /// Pool-to-tick join rows for the current tick set.
    pub fn pool_ticks(&self) -> Vec<PoolTick> {
        self.ticks
            .iter()
            .map(|tick| PoolTick {
                pool_id: self.id.clone(),
                tick_id: tick.id.clone(),
            })
            .collect()
    }
}

/// Membership of a tick in a pool (PostgreSQL `pool_tick` table)
///
/// Unique on (pool_id, tick_id); only ever inserted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolTick {
    pub pool_id: String,
    pub tick_id: String,
}
