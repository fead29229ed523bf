pub mod abis;
pub mod config;
pub mod cron;
pub mod db;
pub mod sync;
pub mod utils;

pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use db::{PoolWriter, PostgresClient};
pub use sync::{build_reader, RunOutcome, SyncError, SyncOrchestrator};
