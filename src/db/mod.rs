#[cfg(test)]
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;
pub mod writer;

pub use postgres::{PgTransaction, PostgresClient};
pub use store::{PoolStore, StoreTransaction};
pub use writer::PoolWriter;
