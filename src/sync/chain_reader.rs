use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use log::{debug, info};
use num_bigint::BigUint;

use crate::db::models::{Pool, Tick, PLACEHOLDER_PRICE0, PLACEHOLDER_PRICE1};
use crate::sync::{ChainClient, PoolReader, RetryPolicy, TickBitmapScanner, TokenFetcher};
use crate::utils::uint_to_biguint;

/// Builds pool snapshots straight from the pool contract.
///
/// Core pool fields and tick reads propagate their failure once retries are
/// exhausted; bitmap words degrade to "no ticks" instead (see
/// [`TickBitmapScanner::scan`]).
pub struct ChainPoolReader {
    client: Arc<dyn ChainClient>,
    retry: RetryPolicy,
    scanner: TickBitmapScanner,
    tokens: TokenFetcher,
    fan_out: usize,
}

impl ChainPoolReader {
    pub fn new(
        client: Arc<dyn ChainClient>,
        retry: RetryPolicy,
        scanner: TickBitmapScanner,
        fan_out: usize,
    ) -> Self {
        let tokens = TokenFetcher::new(client.clone(), retry.clone());

        Self {
            client,
            retry,
            scanner,
            tokens,
            fan_out: fan_out.max(1),
        }
    }

    /// Reads token0/token1, fee, liquidity and slot0 from the contract.
    ///
    /// The fields come from separate calls and may straddle blocks; the
    /// snapshot is best effort, not a consistent ledger view.
    pub async fn find_pool(&self, id: &str) -> Result<Pool> {
        let token0 = self.retry.execute("token0", || self.client.token0()).await?;
        let token1 = self.retry.execute("token1", || self.client.token1()).await?;
        let fee = self.retry.execute("fee", || self.client.fee()).await?;
        let liquidity = self
            .retry
            .execute("liquidity", || self.client.liquidity())
            .await?;
        let sqrt_price = self
            .retry
            .execute("slot0", || self.client.sqrt_price_x96())
            .await?;

        let token0 = self
            .tokens
            .get_token(token0)
            .await
            .context("Failed to fetch token0 metadata")?;
        let token1 = self
            .tokens
            .get_token(token1)
            .await
            .context("Failed to fetch token1 metadata")?;

        Ok(Pool {
            id: id.to_lowercase(),
            fee_tier: i32::try_from(fee).context("Fee tier out of range")?,
            sqrt_price: uint_to_biguint(sqrt_price),
            liquidity: BigUint::from(liquidity),
            token0,
            token1,
            ticks: Vec::new(),
        })
    }

    /// Initialized tick indices inside the configured bitmap window, ascending.
    pub async fn discover_tick_indices(&self) -> Result<Vec<i32>> {
        let tick_spacing = self
            .retry
            .execute("tickSpacing", || self.client.tick_spacing())
            .await?;

        self.scanner.scan(&*self.client, tick_spacing).await
    }

    /// Reads `ticks(index)` for every index, keeping the input order.
    ///
    /// Prices are [`PLACEHOLDER_PRICE0`]/[`PLACEHOLDER_PRICE1`] until a
    /// tick-to-price formula is implemented.
    pub async fn fetch_ticks(&self, pool_id: &str, indices: &[i32]) -> Result<Vec<Tick>> {
        let ticks: Vec<Tick> = stream::iter(indices.iter().copied())
            .map(|index| async move {
                let label = format!("ticks({})", index);
                let record = self
                    .retry
                    .execute(&label, || self.client.tick(index))
                    .await?;

                if !record.initialized {
                    debug!("Tick {} reported as uninitialized", index);
                }

                Ok::<_, anyhow::Error>(Tick::new(
                    pool_id,
                    index,
                    PLACEHOLDER_PRICE0,
                    PLACEHOLDER_PRICE1,
                ))
            })
            .buffered(self.fan_out)
            .try_collect()
            .await?;

        info!("Fetched {} ticks for pool {}", ticks.len(), pool_id);
        Ok(ticks)
    }
}

#[async_trait]
impl PoolReader for ChainPoolReader {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn find_pool(&self, id: &str) -> Result<Option<Pool>> {
        // The configured contract always exists from the reader's point of view
        ChainPoolReader::find_pool(self, id).await.map(Some)
    }

    async fn fetch_ticks(&self, pool: &Pool) -> Result<Vec<Tick>> {
        let indices = self.discover_tick_indices().await?;
        ChainPoolReader::fetch_ticks(self, &pool.id, &indices).await
    }
}
