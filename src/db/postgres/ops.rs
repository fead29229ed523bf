use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use deadpool_postgres::Object;
use log::{error, warn};

use crate::db::models::{Pool, PoolTick, Tick, Token};
use crate::db::postgres::PostgresClient;
use crate::db::store::{PoolStore, StoreTransaction};

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

const INSERT_TOKEN: &str = r#"
    INSERT INTO token (id, symbol, name)
    VALUES ($1, $2, $3)
    ON CONFLICT (id) DO NOTHING
"#;

const UPSERT_TICK: &str = r#"
    INSERT INTO tick (id, tick_idx, price0, price1)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (id) DO UPDATE SET
        tick_idx = EXCLUDED.tick_idx,
        price0 = EXCLUDED.price0,
        price1 = EXCLUDED.price1
"#;

// Big integers are bound as text and cast server-side
const UPSERT_POOL: &str = r#"
    INSERT INTO pool (id, fee_tier, sqrt_price, liquidity, token0_id, token1_id)
    VALUES ($1, $2, $3::TEXT::NUMERIC, $4::TEXT::NUMERIC, $5, $6)
    ON CONFLICT (id) DO UPDATE SET
        fee_tier = EXCLUDED.fee_tier,
        sqrt_price = EXCLUDED.sqrt_price,
        liquidity = EXCLUDED.liquidity,
        token0_id = EXCLUDED.token0_id,
        token1_id = EXCLUDED.token1_id
"#;

const INSERT_POOL_TICK: &str = r#"
    INSERT INTO pool_tick (pool_id, tick_id)
    VALUES ($1, $2)
    ON CONFLICT (pool_id, tick_id) DO NOTHING
"#;

/// One write transaction pinned to a pooled connection.
///
/// If dropped before `commit`/`rollback` (for example when the run deadline
/// cancels the future), the connection is detached from the pool and closed,
/// which makes the server roll the transaction back.
pub struct PgTransaction {
    conn: Option<Object>,
}

impl PgTransaction {
    fn client(&self) -> Result<&Object> {
        self.conn
            .as_ref()
            .ok_or_else(|| anyhow!("transaction already finished"))
    }

    async fn finish(mut self, statement: &str) -> Result<()> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| anyhow!("transaction already finished"))?;

        if let Err(e) = conn.batch_execute(statement).await {
            // The session state is unknown, keep it out of the pool
            drop(Object::take(conn));
            return Err(e).with_context(|| format!("{} failed", statement));
        }

        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Transaction dropped while open, closing its connection");
            drop(Object::take(conn));
        }
    }
}

#[async_trait]
impl PoolStore for PostgresClient {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get PostgreSQL connection")?;
        conn.batch_execute("BEGIN").await.context("BEGIN failed")?;

        Ok(PgTransaction { conn: Some(conn) })
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert_token(&mut self, token: &Token) -> Result<()> {
        self.client()?
            .execute(
                INSERT_TOKEN,
                &[
                    &token.id,
                    &sanitize_string(&token.symbol),
                    &sanitize_string(&token.name),
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert token {}: {:?}", token.id, e);
                e
            })?;

        Ok(())
    }

    async fn upsert_tick(&mut self, tick: &Tick) -> Result<()> {
        self.client()?
            .execute(UPSERT_TICK, &[&tick.id, &tick.tick_idx, &tick.price0, &tick.price1])
            .await?;

        Ok(())
    }

    async fn upsert_pool(&mut self, pool: &Pool) -> Result<()> {
        let sqrt_price = pool.sqrt_price.to_string();
        let liquidity = pool.liquidity.to_string();

        self.client()?
            .execute(
                UPSERT_POOL,
                &[
                    &pool.id,
                    &pool.fee_tier,
                    &sqrt_price,
                    &liquidity,
                    &pool.token0.id,
                    &pool.token1.id,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to upsert pool {}: {:?}", pool.id, e);
                e
            })?;

        Ok(())
    }

    async fn insert_pool_tick(&mut self, pool_tick: &PoolTick) -> Result<()> {
        self.client()?
            .execute(INSERT_POOL_TICK, &[&pool_tick.pool_id, &pool_tick.tick_id])
            .await?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_string_strips_null_bytes() {
        assert_eq!(sanitize_string("US\0DC"), "USDC");
        assert_eq!(sanitize_string("Wrapped Ether"), "Wrapped Ether");
    }

    /// Collapses whitespace so assertions don't depend on indentation.
    fn normalized(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_tokens_and_links_are_insert_only() {
        assert!(normalized(INSERT_TOKEN).ends_with("ON CONFLICT (id) DO NOTHING"));
        assert!(normalized(INSERT_POOL_TICK).ends_with("ON CONFLICT (pool_id, tick_id) DO NOTHING"));
    }

    #[test]
    fn test_tick_upsert_updates_every_column() {
        assert!(normalized(UPSERT_TICK).ends_with(
            "ON CONFLICT (id) DO UPDATE SET tick_idx = EXCLUDED.tick_idx, \
             price0 = EXCLUDED.price0, price1 = EXCLUDED.price1"
        ));
    }

    #[test]
    fn test_pool_upsert_casts_big_integers() {
        let sql = normalized(UPSERT_POOL);

        assert!(sql.contains("VALUES ($1, $2, $3::TEXT::NUMERIC, $4::TEXT::NUMERIC, $5, $6)"));
        assert!(sql.ends_with(
            "ON CONFLICT (id) DO UPDATE SET fee_tier = EXCLUDED.fee_tier, \
             sqrt_price = EXCLUDED.sqrt_price, liquidity = EXCLUDED.liquidity, \
             token0_id = EXCLUDED.token0_id, token1_id = EXCLUDED.token1_id"
        ));
    }
}
