use std::time::Duration;

use crate::{jitter::JitterWindow, server::ServerBinding};

pub const DEFAULT_THREADS: usize = 100;
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Immutable per-run settings handed by reference to every job and plugin call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Persistence namespace selected by the operator.
    pub workspace: String,
    /// Protocol the run executes against each target.
    pub protocol: String,
    /// Fixed worker pool capacity for the run.
    pub pool_size: usize,
    pub jitter: Option<JitterWindow>,
    /// How long the orchestrator waits on a single job. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Upper bound on waiting for workers to drain during teardown.
    pub drain_grace: Duration,
    /// Service port the protocol targets, when the protocol takes one.
    pub port: Option<u16>,
    pub server: ServerBinding,
}

impl SessionConfig {
    pub fn new(workspace: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            protocol: protocol.into(),
            pool_size: Self::pool_size_for_threads(DEFAULT_THREADS),
            jitter: None,
            timeout: None,
            drain_grace: DEFAULT_DRAIN_GRACE,
            port: None,
            server: ServerBinding::default(),
        }
    }

    /// Pool capacity for a requested thread count, keeping one slot of headroom.
    pub const fn pool_size_for_threads(threads: usize) -> usize {
        threads.saturating_add(1)
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_jitter(mut self, jitter: Option<JitterWindow>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_server(mut self, server: ServerBinding) -> Self {
        self.server = server;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reserves_headroom_over_thread_count() {
        let config = SessionConfig::new("default", "tcp");
        assert_eq!(config.pool_size, DEFAULT_THREADS + 1);
        assert_eq!(SessionConfig::pool_size_for_threads(5), 6);
    }
}
