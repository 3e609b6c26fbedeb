use thiserror::Error;

use volley_contracts::PersistenceError;

use crate::{callback::CallbackError, registry::RegistryError};

/// Fatal, pre-run failures. Per-job failures never surface here; they are
/// recorded as [`volley_model::JobOutcome`] values in the run report.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Callback server failed to start: {0}")]
    Bind(#[source] CallbackError),

    #[error("Worker pool allocation failed: {0}")]
    PoolAllocation(String),

    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Errors the operator caused through names, options or settings.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Registry(_))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
