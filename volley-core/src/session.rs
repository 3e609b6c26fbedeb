use std::{fmt, path::Path, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use volley_contracts::{ModuleOptions, ModulePlugin, PersistenceStore};
use volley_model::{ModuleInfo, RunReport, ServerKind, SessionConfig, Target};

use crate::{
    callback::{CallbackError, CallbackServer, CallbackState},
    error::{OrchestratorError, Result},
    gate::{Prompt, preflight_prompts},
    jitter::JitterSource,
    orchestrator::{Job, ScanOrchestrator},
    progress::ProgressSink,
    registry::{LoadedProtocol, PluginRegistry},
    store::StoreSpec,
};

/// Module requested by the operator, with its `-o KEY=VALUE` options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSelection {
    pub name: String,
    pub options: ModuleOptions,
}

impl ModuleSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ModuleOptions::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Runtime hooks supplied by the caller: abort signal, progress trigger, random source.
#[derive(Default)]
pub struct RunControls {
    pub cancel: CancellationToken,
    pub progress_trigger: Option<mpsc::Receiver<()>>,
    pub progress_sink: Option<ProgressSink>,
    pub jitter: Option<JitterSource>,
}

impl fmt::Debug for RunControls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunControls")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress_trigger", &self.progress_trigger.is_some())
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

/// A validated protocol/module pair bound to its session settings.
///
/// Every configuration error surfaces from [`ScanSession::prepare`], before a
/// store is opened or a job is built.
pub struct ScanSession {
    config: Arc<SessionConfig>,
    protocol: LoadedProtocol,
    module: Option<Arc<dyn ModulePlugin>>,
    module_info: Option<ModuleInfo>,
    server_kind: Option<ServerKind>,
}

impl ScanSession {
    pub fn prepare(
        registry: &PluginRegistry,
        mut config: SessionConfig,
        module: Option<&ModuleSelection>,
    ) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(OrchestratorError::configuration(
                "worker pool size must be at least 1",
            ));
        }

        let protocol = registry.load_protocol(&config.protocol)?;
        config.protocol = protocol.name.clone();

        let (module, module_info) = match module {
            Some(selection) => {
                let mut plugin = registry.load_module_for(&selection.name, &protocol.name)?;
                plugin.configure(&selection.options).map_err(|err| {
                    OrchestratorError::configuration(format!("module '{}': {err}", selection.name))
                })?;
                let info = plugin.info();
                (Some(Arc::<dyn ModulePlugin>::from(plugin)), Some(info))
            }
            None => (None, None),
        };

        let server_kind = module_info
            .as_ref()
            .and_then(|info| info.capabilities.server_kind(config.server.kind));
        if server_kind == Some(ServerKind::Https) && config.server.tls.is_none() {
            return Err(OrchestratorError::configuration(
                "https callback server needs tls_cert and tls_key",
            ));
        }

        Ok(Self {
            config: Arc::new(config),
            protocol,
            module,
            module_info,
            server_kind,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn protocol(&self) -> &LoadedProtocol {
        &self.protocol
    }

    pub fn module_info(&self) -> Option<&ModuleInfo> {
        self.module_info.as_ref()
    }

    /// Callback transport this run will start, if the module requires one.
    pub fn server_kind(&self) -> Option<ServerKind> {
        self.server_kind
    }

    /// Operator confirmations owed before dispatch.
    pub fn prompts(&self, target_count: usize) -> Vec<Prompt> {
        self.module_info
            .as_ref()
            .map(|info| preflight_prompts(info, target_count))
            .unwrap_or_default()
    }

    /// Opens the protocol's own store inside `workspace_dir`.
    pub fn open_store(&self, workspace_dir: &Path) -> Result<Arc<dyn PersistenceStore>> {
        let spec = StoreSpec::new(workspace_dir, self.protocol.name.clone());
        Ok((self.protocol.store)(&spec)?)
    }

    /// Starts the callback server when needed, then runs one job per target.
    ///
    /// `store` is shut down exactly once, including when the server fails to bind.
    pub async fn run(
        self,
        targets: Vec<Target>,
        store: Arc<dyn PersistenceStore>,
        controls: RunControls,
    ) -> Result<RunReport> {
        let callback = match (self.server_kind, &self.module) {
            (Some(kind), Some(module)) => {
                let state =
                    CallbackState::new(Arc::clone(module), Arc::clone(&self.config), Arc::clone(&store));
                match CallbackServer::start(state, &self.config.server, kind).await {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        if let Err(shutdown_err) = store.shutdown().await {
                            tracing::warn!(target: "volley::orchestrator", error = %shutdown_err, "store shutdown failed");
                        }
                        return Err(match err {
                            CallbackError::MissingTls | CallbackError::Tls(_) => {
                                OrchestratorError::configuration(err.to_string())
                            }
                            other => OrchestratorError::Bind(other),
                        });
                    }
                }
            }
            _ => None,
        };

        let jobs = Job::for_targets(targets, &self.protocol.plugin, &self.config);
        let mut orchestrator = ScanOrchestrator::new(store)
            .with_module(self.module)
            .with_callback(callback)
            .with_cancel_token(controls.cancel);
        if let Some(jitter) = controls.jitter {
            orchestrator = orchestrator.with_jitter_source(jitter);
        }
        if let Some(trigger) = controls.progress_trigger {
            orchestrator = orchestrator.with_progress_trigger(trigger);
        }
        if let Some(sink) = controls.progress_sink {
            orchestrator = orchestrator.with_progress_sink(sink);
        }

        orchestrator.run(jobs, self.config).await
    }
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("config", &self.config)
            .field("protocol", &self.protocol)
            .field("module", &self.module_info.as_ref().map(|info| &info.name))
            .field("server_kind", &self.server_kind)
            .finish()
    }
}
