use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::sync::{ConfigError as InvalidConfig, RetryPolicy};
use crate::utils::address_to_id;

/// PostgreSQL database connection configuration.
///
/// Holds the `token`, `tick`, `pool` and `pool_tick` tables the sync
/// job writes into.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_schema_path")]
    pub schema_path: String,
}

fn default_pool_size() -> usize {
    16
}

fn default_schema_path() -> String {
    "schema/postgres.sql".to_string()
}

/// JSON-RPC node used by the chain reader.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
}

/// GraphQL indexing API (Uniswap V3 subgraph) used by the index API reader.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexApiSettings {
    pub url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between consecutive tick page requests
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

fn default_batch_size() -> usize {
    1_000
}

fn default_page_delay_ms() -> u64 {
    100
}

/// Where a run reads its pool snapshot from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolSource {
    #[default]
    Chain,
    IndexApi,
}

/// Sync pipeline configuration.
///
/// The bitmap word window defaults to `[-100, 100]`, which covers pools
/// trading near the center of the tick range. Widen it for pools whose
/// liquidity sits far from tick zero.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    pub pool_address: String,
    #[serde(default)]
    pub source: PoolSource,
    #[serde(default = "default_min_word")]
    pub min_word: i16,
    #[serde(default = "default_max_word")]
    pub max_word: i16,
    /// Maximum number of concurrent RPC calls while scanning bitmaps and ticks
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Hard upper bound for a single run, keep it below `interval_secs`
    #[serde(default = "default_run_deadline_secs")]
    pub run_deadline_secs: u64,
}

fn default_min_word() -> i16 {
    -100
}

fn default_max_word() -> i16 {
    100
}

fn default_fan_out() -> usize {
    16
}

fn default_interval_secs() -> u64 {
    1_800 // 30 minutes
}

fn default_run_deadline_secs() -> u64 {
    1_500 // 25 minutes
}

/// Backoff applied to individual remote calls.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.max_backoff_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_backoff_ms() -> u64 {
    32_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

/// Root application configuration.
///
/// Loaded from an optional `config.yaml` at startup, then overridden by
/// `SYNC__<SECTION>__<KEY>` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub chain: Option<ChainSettings>,
    #[serde(default)]
    pub index_api: Option<IndexApiSettings>,
    pub sync: SyncSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("SYNC").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }

    /// Checks everything a run depends on and normalizes the pool address
    /// to lowercase hex.
    pub fn validate(mut self) -> Result<Self, InvalidConfig> {
        let address = Address::from_str(&self.sync.pool_address).map_err(|e| {
            InvalidConfig(format!(
                "sync.pool_address '{}' is not an address: {}",
                self.sync.pool_address, e
            ))
        })?;
        self.sync.pool_address = address_to_id(address);

        match self.sync.source {
            PoolSource::Chain => {
                let chain = self.chain.as_ref().ok_or_else(|| {
                    InvalidConfig("chain.rpc_url is required when sync.source = chain".into())
                })?;
                parse_url("chain.rpc_url", &chain.rpc_url)?;
            },
            PoolSource::IndexApi => {
                let index_api = self.index_api.as_ref().ok_or_else(|| {
                    InvalidConfig("index_api.url is required when sync.source = index_api".into())
                })?;
                parse_url("index_api.url", &index_api.url)?;
                if index_api.batch_size == 0 {
                    return Err(InvalidConfig("index_api.batch_size must be positive".into()));
                }
            },
        }

        if self.sync.min_word > self.sync.max_word {
            return Err(InvalidConfig(format!(
                "sync.min_word ({}) is greater than sync.max_word ({})",
                self.sync.min_word, self.sync.max_word
            )));
        }
        if self.sync.fan_out == 0 {
            return Err(InvalidConfig("sync.fan_out must be positive".into()));
        }
        if self.sync.interval_secs == 0 {
            return Err(InvalidConfig("sync.interval_secs must be positive".into()));
        }
        if self.sync.run_deadline_secs == 0 {
            return Err(InvalidConfig("sync.run_deadline_secs must be positive".into()));
        }
        if self.sync.run_deadline_secs >= self.sync.interval_secs {
            return Err(InvalidConfig(format!(
                "sync.run_deadline_secs ({}) must be below sync.interval_secs ({})",
                self.sync.run_deadline_secs, self.sync.interval_secs
            )));
        }

        Ok(self)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.sync.run_deadline_secs)
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, InvalidConfig> {
    Url::parse(value).map_err(|e| InvalidConfig(format!("{} '{}' is invalid: {}", key, value, e)))
}
