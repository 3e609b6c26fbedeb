use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;
use volley_model::{JitterWindow, ModelError, ServerBinding, ServerKind, TlsPaths};

use crate::{
    bootstrap::{self, CONFIG_FILE_NAME},
    models::{Config, ConfigMetadata, GeneralConfig, ScanConfig},
    sources::{EnvConfig, FileConfig, FileServerConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Use this environment instead of reading `.env` and the process environment.
    pub env: Option<EnvConfig>,
    /// Create the home layout and a default `volley.toml` before loading.
    pub bootstrap: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.options.bootstrap = bootstrap;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env, env_file_loaded) = match &self.options.env {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let home = env.resolve_home();
        let mut bootstrapped = Vec::new();
        if self.options.bootstrap {
            let report = bootstrap::ensure_home(&home).map_err(|source| {
                ConfigLoadError::Filesystem {
                    path: home.clone(),
                    source,
                }
            })?;
            bootstrapped.extend(report.created);
        }

        let (file_config, config_path) = self.load_file_config(&env, &home)?;
        let metadata = ConfigMetadata {
            config_path,
            env_file_loaded,
            bootstrapped,
        };
        let (mut config, warnings) = compose_config(file_config, env, home, metadata)?;

        if self.options.bootstrap {
            let report = bootstrap::ensure_workspace(&config.home, &config.general.workspace)
                .map_err(|source| ConfigLoadError::Filesystem {
                    path: config.workspace_dir(),
                    source,
                })?;
            config.metadata.bootstrapped.extend(report.created);
        }

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
        home: &Path,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let source = ConfigPathSource {
            explicit: self.options.config_path.clone(),
            env: env.config_path.clone(),
            default: home.join(CONFIG_FILE_NAME),
        };
        let (path, provenance) = source.resolved_path();

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    home: PathBuf,
    metadata: ConfigMetadata,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if file_config.is_none() {
        warnings.push_with_hint(
            "No volley.toml detected; using environment and built-in defaults",
            format!(
                "Create {} or pass --config",
                home.join(CONFIG_FILE_NAME).display()
            ),
        );
    }

    let FileConfig {
        general: file_general,
        scan: file_scan,
        server: file_server,
    } = file_config.unwrap_or_default();
    let defaults = ScanConfig::default();

    let general = GeneralConfig {
        workspace: env
            .workspace
            .clone()
            .or(file_general.workspace)
            .unwrap_or_else(|| GeneralConfig::default().workspace),
        log_to_file: env
            .log_to_file
            .or(file_general.log_to_file)
            .unwrap_or(false),
    };

    let threads = match env.threads.as_deref() {
        Some(raw) => parse_env_number("VOLLEY_THREADS", raw)?,
        None => file_scan.threads.unwrap_or(defaults.threads),
    };
    let timeout_secs = match env.timeout.as_deref() {
        Some(raw) => Some(parse_env_number::<u64>("VOLLEY_TIMEOUT", raw)?),
        None => file_scan.timeout_secs,
    };
    let jitter = file_scan
        .jitter
        .as_deref()
        .map(JitterWindow::parse)
        .transpose()
        .map_err(|source| ConfigLoadError::InvalidJitter { source })?;

    let scan = ScanConfig {
        threads,
        timeout: timeout_secs.map(Duration::from_secs),
        jitter,
        drain_grace: file_scan
            .drain_grace_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.drain_grace),
    };

    let server = compose_server(file_server)?;

    let config = Config {
        home,
        general,
        scan,
        server,
        metadata,
    };

    let guard_warnings = validation::apply_guard_rails(&config)?;
    warnings.extend(guard_warnings);
    Ok((config, warnings))
}

fn compose_server(file: FileServerConfig) -> Result<ServerBinding, ConfigLoadError> {
    let defaults = ServerBinding::default();
    let kind = match file.kind.as_deref() {
        Some(raw) => raw
            .parse::<ServerKind>()
            .map_err(|source| ConfigLoadError::InvalidServerKind { source })?,
        None => defaults.kind,
    };

    let tls = match (file.tls_cert, file.tls_key) {
        (Some(cert), Some(key)) => Some(TlsPaths { cert, key }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(ConfigGuardRailError::IncompleteTls {
                present: "tls_cert",
                missing: "tls_key",
            }
            .into());
        }
        (None, Some(_)) => {
            return Err(ConfigGuardRailError::IncompleteTls {
                present: "tls_key",
                missing: "tls_cert",
            }
            .into());
        }
    };

    Ok(ServerBinding {
        host: file.host.unwrap_or(defaults.host),
        port: file.port,
        kind,
        tls,
    })
}

fn parse_env_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigLoadError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigLoadError::InvalidEnv {
            name,
            value: raw.to_string(),
        })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("scan.jitter: {source}")]
    InvalidJitter {
        #[source]
        source: ModelError,
    },
    #[error("server.kind: {source}")]
    InvalidServerKind {
        #[source]
        source: ModelError,
    },
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidEnv { name: &'static str, value: String },
    #[error("failed to prepare {path}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: PathBuf,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> (PathBuf, ConfigPathProvenance) {
        if let Some(path) = &self.explicit {
            return (path.clone(), ConfigPathProvenance::Explicit);
        }
        if let Some(path) = &self.env {
            return (path.clone(), ConfigPathProvenance::Env);
        }
        (self.default.clone(), ConfigPathProvenance::Default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    /// A path the operator named must exist; the default location may not.
    fn is_explicit(self) -> bool {
        matches!(self, ConfigPathProvenance::Explicit | ConfigPathProvenance::Env)
    }
}
