use std::future::IntoFuture;
use std::time::Duration;

use alloy::{
    primitives::{aliases::I24, Address, U256},
    providers::{DynProvider, ProviderBuilder},
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use url::Url;

use crate::abis::{IUniswapV3Pool, IERC20};
use crate::sync::TickBitmapSource;

/// Timeout for individual RPC calls (30 seconds)
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// The part of `ticks(int24)` the sync uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickRecord {
    pub initialized: bool,
}

/// Read-only view of one Uniswap V3 pool contract and its tokens.
///
/// Every method is a single remote call; retries are the caller's business.
#[async_trait]
pub trait ChainClient: TickBitmapSource {
    async fn token0(&self) -> Result<Address>;
    async fn token1(&self) -> Result<Address>;
    async fn fee(&self) -> Result<u32>;
    async fn liquidity(&self) -> Result<u128>;
    /// `slot0().sqrtPriceX96`
    async fn sqrt_price_x96(&self) -> Result<U256>;
    async fn tick_spacing(&self) -> Result<i32>;
    async fn tick(&self, index: i32) -> Result<TickRecord>;
    async fn token_symbol(&self, token: Address) -> Result<String>;
    async fn token_name(&self, token: Address) -> Result<String>;
}

/// [`ChainClient`] backed by an alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyChainClient {
    provider: DynProvider,
    pool_address: Address,
}

impl AlloyChainClient {
    pub fn new(rpc_url: &str, pool_address: Address) -> Result<Self> {
        let url = Url::parse(rpc_url).context("Invalid RPC URL")?;

        let client = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            provider: DynProvider::new(client),
            pool_address,
        })
    }
}

/// Awaits a contract call with [`RPC_CALL_TIMEOUT`].
async fn call<F, T, E>(label: &str, request: F) -> Result<T>
where
    F: IntoFuture<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::time::timeout(RPC_CALL_TIMEOUT, request)
        .await
        .with_context(|| format!("{} timed out", label))?
        .with_context(|| format!("{} failed", label))
}

#[async_trait]
impl TickBitmapSource for AlloyChainClient {
    async fn tick_bitmap(&self, word: i16) -> Result<U256> {
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        call("tickBitmap", pool.tickBitmap(word).call()).await
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn token0(&self) -> Result<Address> {
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        call("token0", pool.token0().call()).await
    }

    async fn token1(&self) -> Result<Address> {
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        call("token1", pool.token1().call()).await
    }

    async fn fee(&self) -> Result<u32> {
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        let fee = call("fee", pool.fee().call()).await?;
        Ok(fee.to::<u32>())
    }

    async fn liquidity(&self) -> Result<u128> {
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        call("liquidity", pool.liquidity().call()).await
    }

    async fn sqrt_price_x96(&self) -> Result<U256> {
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        let slot0 = call("slot0", pool.slot0().call()).await?;
        Ok(U256::from(slot0.sqrtPriceX96))
    }

    async fn tick_spacing(&self) -> Result<i32> {
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        let spacing = call("tickSpacing", pool.tickSpacing().call()).await?;
        Ok(spacing.as_i32())
    }

    async fn tick(&self, index: i32) -> Result<TickRecord> {
        let tick = I24::try_from(index).map_err(|_| anyhow!("tick {} does not fit int24", index))?;
        let pool = IUniswapV3Pool::new(self.pool_address, &self.provider);
        let info = call("ticks", pool.ticks(tick).call()).await?;

        Ok(TickRecord {
            initialized: info.initialized,
        })
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        let contract = IERC20::new(token, &self.provider);
        call("symbol", contract.symbol().call()).await
    }

    async fn token_name(&self, token: Address) -> Result<String> {
        let contract = IERC20::new(token, &self.provider);
        call("name", contract.name().call()).await
    }
}
