use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. With `log_dir`, records are also written to a
/// timestamped file there, whose path is returned.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{level},hyper=warn,rustls=warn,axum_server=warn"))
    });

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            let path = dir.join(format!(
                "volley_{}.log",
                chrono::Local::now().format("%Y-%m-%d_%H%M%S")
            ));
            let file = File::create(&path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(log_path)
}
