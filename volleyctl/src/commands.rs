use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;
use volley_config::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, ensure_workspace, resolve};
use volley_contracts::PersistenceStore;
use volley_core::{MemoryStore, ModuleSelection, RunControls, ScanSession, builtin_registry};
use volley_model::{JobOutcome, RunReport};

use crate::{cli::Cli, console, logging, prompts};

/// `--list-protocols`, `-L` and `--options`. Nothing is loaded from disk.
pub fn list(cli: &Cli) -> anyhow::Result<ExitCode> {
    let registry = builtin_registry();

    if cli.list_protocols {
        for name in registry.list_protocols().keys() {
            println!("{name}");
        }
    }

    if cli.list_modules {
        let modules = match cli.protocol.as_deref() {
            Some(protocol) => {
                registry.load_protocol(protocol)?;
                registry.list_modules_for(protocol)
            }
            None => registry.list_modules(),
        };
        for (name, info) in modules {
            println!("{name:<16} {}", info.description);
        }
    }

    if cli.show_options
        && let Some(module) = cli.module.as_deref()
    {
        let info = registry.module_info(module)?;
        println!("{} options:\n{}", info.name, info.options_help());
    }

    Ok(ExitCode::SUCCESS)
}

pub async fn scan(cli: Cli) -> anyhow::Result<ExitCode> {
    let Some(protocol) = cli.protocol.clone() else {
        bail!("a protocol is required");
    };

    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        bootstrap: true,
        ..ConfigLoaderOptions::default()
    })
    .load()
    .context("failed to load configuration")?;

    if let Some(workspace) = cli.workspace.clone() {
        config.general.workspace = workspace;
        ensure_workspace(&config.home, &config.general.workspace)
            .with_context(|| format!("failed to create {}", config.workspace_dir().display()))?;
    }
    if let Some(threads) = cli.threads {
        config.scan.threads = threads;
    }
    if let Some(timeout) = cli.timeout {
        config.scan.timeout = Some(std::time::Duration::from_secs(timeout));
    }
    if cli.jitter.is_some() {
        config.scan.jitter = cli.jitter;
    }
    if let Some(kind) = cli.server {
        config.server.kind = kind;
    }
    if let Some(host) = cli.server_host.clone() {
        config.server.host = host;
    }
    if cli.server_port.is_some() {
        config.server.port = cli.server_port;
    }

    let log_dir = config.general.log_to_file.then(|| config.logs_dir());
    let log_path = logging::init(cli.verbose, log_dir.as_deref())?;

    if config.metadata.env_file_loaded {
        tracing::info!("loaded .env file");
    }
    if let Some(path) = &log_path {
        tracing::info!(path = %path.display(), "logging to file");
    }
    for path in &config.metadata.bootstrapped {
        tracing::info!(path = %path.display(), "created on first run");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                tracing::warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => tracing::warn!(message = %warning.message, "configuration warning"),
        }
    }

    let targets = resolve(&cli.targets).context("failed to resolve targets")?;
    if targets.is_empty() {
        bail!("no targets given");
    }

    let selection = cli.module.as_deref().map(|name| {
        cli.module_options
            .iter()
            .fold(ModuleSelection::new(name), |selection, (key, value)| {
                selection.with_option(key.clone(), value.clone())
            })
    });
    let session_config = config.session_config(&protocol).with_port(cli.port);
    let registry = builtin_registry();
    let session = ScanSession::prepare(&registry, session_config, selection.as_ref())?;

    for prompt in session.prompts(targets.len()) {
        if cli.yes {
            tracing::info!(prompt = %prompt, "confirmation skipped by --yes");
            continue;
        }
        let accepted = tokio::task::spawn_blocking(move || prompts::confirm(&prompt))
            .await
            .context("confirmation prompt failed")??;
        if !accepted {
            eprintln!("Aborted, no jobs were started.");
            return Ok(ExitCode::FAILURE);
        }
    }

    let store: Arc<dyn PersistenceStore> = if cli.no_store {
        Arc::new(MemoryStore::new())
    } else {
        session
            .open_store(&config.workspace_dir())
            .context("failed to open the workspace store")?
    };

    let cancel = CancellationToken::new();
    console::cancel_on_interrupt(cancel.clone());
    let progress_trigger = if cli.no_progress {
        None
    } else {
        Some(console::progress_requests().context("failed to watch stdin")?)
    };

    tracing::info!(
        protocol = %session.config().protocol,
        module = session.module_info().map(|info| info.name.as_str()).unwrap_or("-"),
        targets = targets.len(),
        threads = config.scan.threads,
        workspace = %config.general.workspace,
        "starting scan"
    );
    let report = session
        .run(
            targets,
            store,
            RunControls {
                cancel,
                progress_trigger,
                ..RunControls::default()
            },
        )
        .await?;

    print_report(&report);
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RunReport) {
    for job in &report.jobs {
        if job.outcome != JobOutcome::Success {
            println!("{:<40} {}", job.target.as_str(), job.outcome);
        }
    }
    let status = if report.cancelled { " (cancelled)" } else { "" };
    println!(
        "{}{status} in {:.1}s",
        report.summary(),
        report.elapsed.as_secs_f64()
    );
}
