use std::time::Duration;

use thiserror::Error;
use volley_model::ServerKind;

use crate::models::Config;

/// Above this many threads the run is more likely to exhaust sockets than go faster.
pub const THREAD_WARNING_THRESHOLD: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("scan.threads must be at least 1")]
    ZeroThreads,
    #[error("server.{missing} is required when server.{present} is set")]
    IncompleteTls {
        present: &'static str,
        missing: &'static str,
    },
    #[error("workspace name '{name}' {reason}")]
    InvalidWorkspace { name: String, reason: &'static str },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    validate_workspace(&config.general.workspace)?;

    if config.scan.threads == 0 {
        return Err(ConfigGuardRailError::ZeroThreads);
    }
    if config.scan.threads > THREAD_WARNING_THRESHOLD {
        warnings.push_with_hint(
            format!("scan.threads = {} is unusually high", config.scan.threads),
            "Each worker holds an OS thread and usually a socket; check `ulimit -n`",
        );
    }

    if config.scan.timeout == Some(Duration::ZERO) {
        warnings.push_with_hint(
            "scan timeout is 0; every job will time out immediately",
            "Remove timeout_secs to wait indefinitely",
        );
    }

    if config.scan.drain_grace.is_zero() {
        warnings.push("drain grace is 0; workers still running at teardown are abandoned");
    }

    if config.server.kind == ServerKind::Https && config.server.tls.is_none() {
        warnings.push_with_hint(
            "https callback server selected without tls_cert/tls_key",
            "Modules that need the configured server will fail; set server.tls_cert and server.tls_key or use --server http",
        );
    }

    Ok(warnings)
}

fn validate_workspace(name: &str) -> Result<(), ConfigGuardRailError> {
    let invalid = |reason| ConfigGuardRailError::InvalidWorkspace {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("is empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(invalid("must be a plain directory name"));
    }
    Ok(())
}
