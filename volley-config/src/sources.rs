use std::{env, path::PathBuf};

use serde::Deserialize;

/// Raw `volley.toml` contents. Every section and key is optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub general: FileGeneralConfig,
    pub scan: FileScanConfig,
    pub server: FileServerConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileGeneralConfig {
    pub workspace: Option<String>,
    pub log_to_file: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileScanConfig {
    pub threads: Option<usize>,
    pub timeout_secs: Option<u64>,
    /// `"max"` or `"min-max"`, in seconds.
    pub jitter: Option<String>,
    pub drain_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub kind: Option<String>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

/// Values read from the process environment.
///
/// Numeric variables are kept as raw strings so the loader can reject
/// malformed values instead of silently ignoring them.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub home: Option<PathBuf>,
    pub user_home: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub workspace: Option<String>,
    pub threads: Option<String>,
    pub timeout: Option<String>,
    pub log_to_file: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the environment view from an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            home: var("VOLLEY_HOME").map(PathBuf::from),
            user_home: var("HOME").map(PathBuf::from),
            config_path: var("VOLLEY_CONFIG").map(PathBuf::from),
            workspace: var("VOLLEY_WORKSPACE"),
            threads: var("VOLLEY_THREADS"),
            timeout: var("VOLLEY_TIMEOUT"),
            log_to_file: var("VOLLEY_LOG_TO_FILE").and_then(|value| parse_bool(&value)),
        }
    }

    /// `VOLLEY_HOME`, else `~/.volley`, else `.volley` in the working directory.
    pub fn resolve_home(&self) -> PathBuf {
        if let Some(home) = &self.home {
            return home.clone();
        }
        match &self.user_home {
            Some(user_home) => user_home.join(".volley"),
            None => PathBuf::from(".volley"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn home_prefers_volley_home() {
        let env = env_from(&[("VOLLEY_HOME", "/srv/volley"), ("HOME", "/home/op")]);
        assert_eq!(env.resolve_home(), PathBuf::from("/srv/volley"));

        let env = env_from(&[("HOME", "/home/op")]);
        assert_eq!(env.resolve_home(), PathBuf::from("/home/op/.volley"));
    }

    #[test]
    fn blank_values_are_unset() {
        let env = env_from(&[("VOLLEY_WORKSPACE", "  "), ("VOLLEY_LOG_TO_FILE", "yes")]);
        assert!(env.workspace.is_none());
        assert_eq!(env.log_to_file, Some(true));
    }

    #[test]
    fn file_sections_default_when_missing() {
        let file: FileConfig = toml::from_str("[scan]\nthreads = 8\n").expect("parse");
        assert_eq!(file.scan.threads, Some(8));
        assert!(file.server.kind.is_none());
        assert!(file.general.workspace.is_none());
    }
}
