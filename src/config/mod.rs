#[allow(clippy::module_inception)]
mod config;

pub use config::{
    ChainSettings, IndexApiSettings, PoolSource, PostgresSettings, RetrySettings, Settings,
    SyncSettings,
};
