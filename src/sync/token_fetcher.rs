use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::Result;
use log::info;
use moka::future::Cache;

use crate::db::models::Token;
use crate::sync::{ChainClient, RetryPolicy};
use crate::utils::address_to_id;

/// ERC-20 symbol/name lookup for the pool's tokens.
///
/// Token rows are immutable once stored, so successful lookups are cached
/// for the lifetime of the process and later runs skip the RPC calls.
#[derive(Clone)]
pub struct TokenFetcher {
    client: Arc<dyn ChainClient>,
    retry: RetryPolicy,
    tokens: Cache<Address, Token>,
}

impl TokenFetcher {
    pub fn new(client: Arc<dyn ChainClient>, retry: RetryPolicy) -> Self {
        // Create cache with 1,000 capacity and 24 hour TTL
        let tokens = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(86_400))
            .build();

        Self {
            client,
            retry,
            tokens,
        }
    }

    pub async fn get_token(&self, address: Address) -> Result<Token> {
        if let Some(token) = self.tokens.get(&address).await {
            return Ok(token);
        }

        let id = address_to_id(address);
        let symbol = self
            .retry
            .execute(&format!("symbol({})", id), || self.client.token_symbol(address))
            .await?;
        let name = self
            .retry
            .execute(&format!("name({})", id), || self.client.token_name(address))
            .await?;

        let token = Token::new(id, symbol, name);
        info!("Fetched token metadata {} ({})", token.symbol, token.id);
        self.tokens.insert(address, token.clone()).await;

        Ok(token)
    }
}
