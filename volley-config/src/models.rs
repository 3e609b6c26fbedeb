use std::{path::PathBuf, time::Duration};

use volley_model::{
    JitterWindow, ServerBinding, SessionConfig,
    session::{DEFAULT_DRAIN_GRACE, DEFAULT_THREADS},
};

pub const DEFAULT_WORKSPACE: &str = "default";

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of logs, workspaces and the default `volley.toml`.
    pub home: PathBuf,
    pub general: GeneralConfig,
    pub scan: ScanConfig,
    pub server: ServerBinding,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralConfig {
    pub workspace: String,
    pub log_to_file: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            workspace: DEFAULT_WORKSPACE.to_string(),
            log_to_file: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Requested concurrency. The pool gets one extra slot on top.
    pub threads: usize,
    pub timeout: Option<Duration>,
    pub jitter: Option<JitterWindow>,
    pub drain_grace: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            timeout: None,
            jitter: None,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
    /// Paths created by first-run bootstrap during this load.
    pub bootstrapped: Vec<PathBuf>,
}

impl Config {
    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.home.join("workspaces").join(&self.general.workspace)
    }

    /// Per-run settings for `protocol`.
    pub fn session_config(&self, protocol: &str) -> SessionConfig {
        SessionConfig::new(self.general.workspace.clone(), protocol)
            .with_pool_size(SessionConfig::pool_size_for_threads(self.scan.threads))
            .with_jitter(self.scan.jitter)
            .with_timeout(self.scan.timeout)
            .with_drain_grace(self.scan.drain_grace)
            .with_server(self.server.clone())
    }
}
