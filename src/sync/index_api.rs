use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{Pool, Tick, Token};
use crate::sync::{ConfigError, GraphQlTransport, PoolReader};

const POOL_QUERY: &str = r#"
query Pool($id: ID!) {
  pool(id: $id) {
    id
    feeTier
    sqrtPrice
    liquidity
    token0 { id symbol name }
    token1 { id symbol name }
  }
}"#;

const TICKS_QUERY: &str = r#"
query PoolTicks($id: ID!, $first: Int!, $skip: Int!) {
  pool(id: $id) {
    ticks(first: $first, skip: $skip, orderBy: tickIdx, orderDirection: asc) {
      id
      tickIdx
      price0
      price1
    }
  }
}"#;

/// Subgraphs emit BigInt/BigDecimal as strings, some mirrors as plain numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Text(String),
    Number(serde_json::Number),
}

impl Numeric {
    fn parse<T>(&self, field: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = match self {
            Numeric::Text(text) => text.trim().to_string(),
            Numeric::Number(number) => number.to_string(),
        };

        text.parse::<T>()
            .map_err(|e| anyhow!("invalid {} value {:?}: {}", field, text, e))
    }
}

#[derive(Debug, Deserialize)]
struct TokenRecord {
    id: String,
    symbol: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolRecord {
    fee_tier: Numeric,
    sqrt_price: Numeric,
    liquidity: Numeric,
    token0: TokenRecord,
    token1: TokenRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickRecord {
    tick_idx: Numeric,
    price0: Numeric,
    price1: Numeric,
}

#[derive(Debug, Deserialize)]
struct PoolData {
    pool: Option<PoolRecord>,
}

#[derive(Debug, Deserialize)]
struct TicksData {
    pool: Option<TickPage>,
}

#[derive(Debug, Deserialize)]
struct TickPage {
    #[serde(default)]
    ticks: Vec<TickRecord>,
}

/// Reads pool snapshots from a Uniswap V3 subgraph.
///
/// Requests are not retried: a failed request fails the run.
pub struct IndexApiPoolReader {
    transport: Arc<dyn GraphQlTransport>,
    batch_size: usize,
    page_delay: Duration,
}

impl IndexApiPoolReader {
    pub fn new(transport: Arc<dyn GraphQlTransport>, batch_size: usize, page_delay: Duration) -> Self {
        Self {
            transport,
            batch_size,
            page_delay,
        }
    }

    /// `Ok(None)` when the subgraph does not know the pool.
    pub async fn find_pool(&self, id: &str) -> Result<Option<Pool>> {
        let id = id.to_lowercase();
        let data = self.transport.query(POOL_QUERY, json!({ "id": id })).await?;

        let data: PoolData = serde_json::from_value(data).context("Malformed pool response")?;
        let Some(record) = data.pool else {
            return Ok(None);
        };

        let pool = Pool {
            fee_tier: record.fee_tier.parse("feeTier")?,
            sqrt_price: record.sqrt_price.parse::<BigUint>("sqrtPrice")?,
            liquidity: record.liquidity.parse::<BigUint>("liquidity")?,
            token0: Token::new(record.token0.id, record.token0.symbol, record.token0.name),
            token1: Token::new(record.token1.id, record.token1.symbol, record.token1.name),
            ticks: Vec::new(),
            id,
        };

        Ok(Some(pool))
    }

    /// Pages through the pool's ticks by `tickIdx`, `batch_size` rows at a time.
    ///
    /// Stops at the first page shorter than `batch_size`. Any failing page
    /// discards everything fetched so far.
    pub async fn fetch_ticks_in_batches(&self, id: &str, batch_size: usize) -> Result<Vec<Tick>> {
        if batch_size == 0 {
            return Err(ConfigError("index API batch size must be positive".to_string()).into());
        }

        let id = id.to_lowercase();
        let mut ticks = Vec::new();
        let mut skip = 0usize;

        loop {
            if skip > 0 {
                tokio::time::sleep(self.page_delay).await;
            }

            let variables = json!({ "id": id, "first": batch_size, "skip": skip });
            let data = self
                .transport
                .query(TICKS_QUERY, variables)
                .await
                .with_context(|| format!("Tick page at skip {} failed", skip))?;

            let data: TicksData =
                serde_json::from_value(data).context("Malformed ticks response")?;
            let page = data.pool.map(|p| p.ticks).unwrap_or_default();
            let count = page.len();

            for record in page {
                ticks.push(Tick::new(
                    &id,
                    record.tick_idx.parse("tickIdx")?,
                    record.price0.parse("price0")?,
                    record.price1.parse("price1")?,
                ));
            }

            debug!("Fetched {} ticks at skip {} for pool {}", count, skip, id);

            if count < batch_size {
                break;
            }
            skip += batch_size;
        }

        info!("Fetched {} ticks for pool {} from index API", ticks.len(), id);
        Ok(ticks)
    }
}

#[async_trait]
impl PoolReader for IndexApiPoolReader {
    fn name(&self) -> &'static str {
        "index_api"
    }

    async fn find_pool(&self, id: &str) -> Result<Option<Pool>> {
        IndexApiPoolReader::find_pool(self, id).await
    }

    async fn fetch_ticks(&self, pool: &Pool) -> Result<Vec<Tick>> {
        self.fetch_ticks_in_batches(&pool.id, self.batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;

    const POOL: &str = "0x8ad599c3a0ff1de082011efddc58f1908eb6e6d8";

    /// Replays canned responses in order and records the variables it saw.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value>>>,
        requests: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Value> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GraphQlTransport for ScriptedTransport {
        async fn query(&self, _query: &str, variables: Value) -> Result<Value> {
            self.requests.lock().unwrap().push(variables);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("unexpected request")))
        }
    }

    fn page(indices: &[i32]) -> Result<Value> {
        let ticks: Vec<Value> = indices
            .iter()
            .map(|idx| {
                json!({
                    "id": format!("{}#{}", POOL, idx),
                    "tickIdx": idx.to_string(),
                    "price0": "1.0001",
                    "price1": 0.9999
                })
            })
            .collect();
        Ok(json!({ "pool": { "ticks": ticks } }))
    }

    fn reader(transport: Arc<ScriptedTransport>) -> IndexApiPoolReader {
        IndexApiPoolReader::new(transport, 2, Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_page_ends_pagination() {
        let transport = ScriptedTransport::new(vec![page(&[-60, 0]), page(&[])]);

        let ticks = reader(transport.clone())
            .fetch_ticks_in_batches(POOL, 2)
            .await
            .unwrap();

        assert_eq!(ticks.len(), 2);
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["skip"], 2);
        assert_eq!(requests[1]["first"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_concatenate_in_order() {
        let transport =
            ScriptedTransport::new(vec![page(&[-120, -60]), page(&[0, 60]), page(&[])]);
        let start = Instant::now();

        let ticks = reader(transport.clone())
            .fetch_ticks_in_batches(POOL, 2)
            .await
            .unwrap();

        let indices: Vec<i32> = ticks.iter().map(|t| t.tick_idx).collect();
        assert_eq!(indices, vec![-120, -60, 0, 60]);
        assert_eq!(transport.requests().len(), 3);
        // Two gaps between three requests
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(ticks[2], Tick::new(POOL, 0, 1.0001, 0.9999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_failure_discards_earlier_pages() {
        let transport = ScriptedTransport::new(vec![
            page(&[-120, -60]),
            Err(anyhow!("502 Bad Gateway")),
        ]);

        let err = reader(transport.clone())
            .fetch_ticks_in_batches(POOL, 2)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("502 Bad Gateway"));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_config_error() {
        let transport = ScriptedTransport::new(vec![]);

        let err = reader(transport.clone())
            .fetch_ticks_in_batches(POOL, 0)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ConfigError>().is_some());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pool_is_none() {
        let transport = ScriptedTransport::new(vec![Ok(json!({ "pool": null }))]);

        let pool = reader(transport).find_pool(POOL).await.unwrap();

        assert!(pool.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_propagates_unchanged() {
        let transport = ScriptedTransport::new(vec![Err(anyhow!("connection refused"))]);

        let err = reader(transport).find_pool(POOL).await.unwrap_err();

        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(err.chain().count(), 1);
    }

    #[tokio::test]
    async fn test_pool_numerics_as_strings_or_numbers() {
        let transport = ScriptedTransport::new(vec![Ok(json!({
            "pool": {
                "id": POOL,
                "feeTier": 3000,
                "sqrtPrice": "1350174849792634181862360983626536",
                "liquidity": "21874000000000000000",
                "token0": { "id": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "symbol": "USDC", "name": "USD Coin" },
                "token1": { "id": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "symbol": "WETH", "name": "Wrapped Ether" }
            }
        }))]);

        let pool = reader(transport)
            .find_pool(&POOL.to_uppercase().replace("0X", "0x"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pool.id, POOL);
        assert_eq!(pool.fee_tier, 3000);
        assert_eq!(pool.sqrt_price.to_string(), "1350174849792634181862360983626536");
        assert_eq!(pool.liquidity.to_string(), "21874000000000000000");
        assert_eq!(pool.token0.id, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        assert!(pool.ticks.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_numeric_is_an_error() {
        let transport = ScriptedTransport::new(vec![Ok(json!({
            "pool": { "ticks": [{ "id": "x", "tickIdx": "sixty", "price0": "1", "price1": "1" }] }
        }))]);

        let err = reader(transport)
            .fetch_ticks_in_batches(POOL, 2)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("tickIdx"));
    }
}
