pub mod pool_sync;
