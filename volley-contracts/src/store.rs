use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("store is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// One observation a plugin made about a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub protocol: String,
    pub target: String,
    pub kind: String,
    pub data: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

impl HostRecord {
    pub fn new(
        protocol: impl Into<String>,
        target: impl Into<String>,
        kind: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            target: target.into(),
            kind: kind.into(),
            data,
            observed_at: Utc::now(),
        }
    }
}

/// Workspace-scoped store shared by every job of a run.
///
/// Implementations serialize their own writes; `record` is called concurrently
/// from worker threads. `shutdown` is called exactly once per run, after which
/// writes fail with [`PersistenceError::Closed`].
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    fn record(&self, record: HostRecord) -> Result<(), PersistenceError>;

    async fn shutdown(&self) -> Result<(), PersistenceError>;
}
