//! Pool snapshot pipeline: readers, retries and the orchestrated run.

pub mod chain_client;
pub mod chain_reader;
pub mod error;
pub mod graphql;
pub mod index_api;
pub mod orchestrator;
pub mod reader;
pub mod retry;
pub mod tick_bitmap;
pub mod token_fetcher;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use log::info;

pub use chain_client::{AlloyChainClient, ChainClient, TickRecord};
pub use chain_reader::ChainPoolReader;
pub use error::{ConfigError, SyncError};
pub use graphql::{GraphQlTransport, HttpGraphQlClient};
pub use index_api::IndexApiPoolReader;
pub use orchestrator::{RunOutcome, SyncOrchestrator};
pub use reader::PoolReader;
pub use retry::RetryPolicy;
pub use tick_bitmap::{decode_word, TickBitmapScanner, TickBitmapSource};
pub use token_fetcher::TokenFetcher;

use crate::config::{PoolSource, Settings};

/// Builds the reader selected by `sync.source` from validated settings.
pub fn build_reader(settings: &Settings) -> Result<Arc<dyn PoolReader>> {
    let sync = &settings.sync;

    let reader: Arc<dyn PoolReader> = match sync.source {
        PoolSource::Chain => {
            let chain = settings
                .chain
                .as_ref()
                .ok_or_else(|| ConfigError("missing chain settings".to_string()))?;
            let address =
                Address::from_str(&sync.pool_address).context("Invalid pool address")?;

            let retry = settings.retry.policy();
            let client = Arc::new(AlloyChainClient::new(&chain.rpc_url, address)?);
            let scanner =
                TickBitmapScanner::new(sync.min_word, sync.max_word, sync.fan_out, retry.clone())?;

            Arc::new(ChainPoolReader::new(client, retry, scanner, sync.fan_out))
        },
        PoolSource::IndexApi => {
            let index_api = settings
                .index_api
                .as_ref()
                .ok_or_else(|| ConfigError("missing index_api settings".to_string()))?;
            let transport = Arc::new(HttpGraphQlClient::new(&index_api.url)?);

            Arc::new(IndexApiPoolReader::new(
                transport,
                index_api.batch_size,
                Duration::from_millis(index_api.page_delay_ms),
            ))
        },
    };

    info!("Using {} reader for pool {}", reader.name(), sync.pool_address);
    Ok(reader)
}
