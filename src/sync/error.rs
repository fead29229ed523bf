use std::time::Duration;

use thiserror::Error;

/// Invalid or missing configuration. Never retried.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

/// Why a sync run ended without persisting a snapshot.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The reader could not produce a snapshot; nothing was written.
    #[error("failed to fetch pool {pool_id} during {stage}")]
    Fetch {
        pool_id: String,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
    /// The store transaction was rolled back.
    #[error("failed to persist pool {pool_id}")]
    Write {
        pool_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("sync of pool {pool_id} exceeded the run deadline of {after:?}")]
    Timeout { pool_id: String, after: Duration },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Classifies a reader failure, surfacing configuration errors buried in the chain.
    pub(crate) fn fetch(pool_id: &str, stage: &'static str, source: anyhow::Error) -> Self {
        if let Some(config) = source.chain().find_map(|e| e.downcast_ref::<ConfigError>()) {
            return Self::Config(ConfigError(config.0.clone()));
        }

        Self::Fetch {
            pool_id: pool_id.to_string(),
            stage,
            source,
        }
    }
}
