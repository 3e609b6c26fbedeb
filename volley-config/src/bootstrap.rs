use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Written to `<home>/volley.toml` on first run.
pub const DEFAULT_CONFIG_TOML: &str = r#"# Volley configuration. CLI flags override these values, environment
# variables (VOLLEY_WORKSPACE, VOLLEY_THREADS, VOLLEY_TIMEOUT) sit in between.

[general]
workspace = "default"
log_to_file = false

[scan]
threads = 100
# timeout_secs = 30
# jitter = "0-3"
drain_grace_secs = 10

[server]
host = "0.0.0.0"
kind = "https"
# port = 8443
# tls_cert = "/path/to/cert.pem"
# tls_key = "/path/to/key.pem"
"#;

pub const CONFIG_FILE_NAME: &str = "volley.toml";

/// Paths created by a bootstrap pass. Empty when everything already existed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created: Vec<PathBuf>,
}

impl BootstrapReport {
    pub fn is_fresh(&self) -> bool {
        !self.created.is_empty()
    }
}

/// Creates `<home>`, `<home>/logs` and a default `volley.toml` when missing.
pub fn ensure_home(home: &Path) -> io::Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    for dir in [home.to_path_buf(), home.join("logs")] {
        create_dir(&dir, &mut report)?;
    }

    let config_path = home.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        fs::write(&config_path, DEFAULT_CONFIG_TOML)?;
        tracing::info!(target: "volley::config", path = %config_path.display(), "wrote default configuration");
        report.created.push(config_path);
    }

    Ok(report)
}

/// Creates `<home>/workspaces/<workspace>` when missing.
pub fn ensure_workspace(home: &Path, workspace: &str) -> io::Result<BootstrapReport> {
    let mut report = BootstrapReport::default();
    create_dir(&home.join("workspaces").join(workspace), &mut report)?;
    Ok(report)
}

fn create_dir(dir: &Path, report: &mut BootstrapReport) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    tracing::debug!(target: "volley::config", path = %dir.display(), "created directory");
    report.created.push(dir.to_path_buf());
    Ok(())
}
