use std::fmt;

use tokio_util::sync::CancellationToken;
use volley_model::{SessionConfig, Target};

use crate::{
    plugin::{ModulePlugin, PluginError},
    store::{HostRecord, PersistenceStore},
};

/// Everything a protocol sees while running against one target.
///
/// The cancellation token fires when the orchestrator stops waiting on the
/// job (timeout) or the whole run is aborted. Honoring it is optional: a
/// plugin that ignores it keeps its pool slot until it returns.
pub struct JobContext<'a> {
    config: &'a SessionConfig,
    store: &'a dyn PersistenceStore,
    target: &'a Target,
    module: Option<&'a dyn ModulePlugin>,
    callback_url: Option<&'a str>,
    cancel: &'a CancellationToken,
}

impl<'a> JobContext<'a> {
    pub fn new(
        config: &'a SessionConfig,
        store: &'a dyn PersistenceStore,
        target: &'a Target,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            target,
            module: None,
            callback_url: None,
            cancel,
        }
    }

    pub fn with_module(mut self, module: Option<&'a dyn ModulePlugin>) -> Self {
        self.module = module;
        self
    }

    pub fn with_callback_url(mut self, url: Option<&'a str>) -> Self {
        self.callback_url = url;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        self.config
    }

    pub fn store(&self) -> &dyn PersistenceStore {
        self.store
    }

    pub fn target(&self) -> &Target {
        self.target
    }

    pub fn module(&self) -> Option<&dyn ModulePlugin> {
        self.module
    }

    /// Base URL of the running callback server, if the loaded module asked for one.
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Errors with [`PluginError::Cancelled`] once the orchestrator gave up on this job.
    pub fn checkpoint(&self) -> Result<(), PluginError> {
        if self.is_cancelled() {
            return Err(PluginError::Cancelled);
        }
        Ok(())
    }

    /// Runs the loaded module against this target, if there is one.
    pub fn run_module(&self) -> Result<(), PluginError> {
        match self.module {
            Some(module) => module.on_target(self),
            None => Ok(()),
        }
    }

    /// Stores an observation about the current target.
    ///
    /// Store failures never fail the job: they are logged and the record is dropped.
    pub fn record(&self, kind: &str, data: serde_json::Value) {
        let record = HostRecord::new(
            self.config.protocol.clone(),
            self.target.as_str(),
            kind,
            data,
        );
        if let Err(err) = self.store.record(record) {
            tracing::warn!(
                target: "volley::store",
                host = %self.target,
                kind,
                error = %err,
                "dropping host record"
            );
        }
    }
}

impl fmt::Debug for JobContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("target", &self.target)
            .field("protocol", &self.config.protocol)
            .field("has_module", &self.module.is_some())
            .field("callback_url", &self.callback_url)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PersistenceError;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Store {}

        #[async_trait]
        impl PersistenceStore for Store {
            fn record(&self, record: HostRecord) -> Result<(), PersistenceError>;
            async fn shutdown(&self) -> Result<(), PersistenceError>;
        }
    }

    #[test]
    fn record_failures_are_swallowed() {
        let mut store = MockStore::new();
        store
            .expect_record()
            .times(1)
            .returning(|_| Err(PersistenceError::Closed));

        let config = SessionConfig::new("default", "tcp");
        let target = Target::from("10.0.0.1");
        let cancel = CancellationToken::new();
        let ctx = JobContext::new(&config, &store, &target, &cancel);

        ctx.record("reachable", json!({ "port": 445 }));
    }

    #[test]
    fn record_tags_protocol_and_target() {
        let mut store = MockStore::new();
        store
            .expect_record()
            .withf(|record| {
                record.protocol == "tcp" && record.target == "db01" && record.kind == "banner"
            })
            .times(1)
            .returning(|_| Ok(()));

        let config = SessionConfig::new("default", "tcp");
        let target = Target::from("db01");
        let cancel = CancellationToken::new();
        JobContext::new(&config, &store, &target, &cancel).record("banner", json!("ssh"));
    }

    #[test]
    fn checkpoint_reports_cancellation() {
        let store = MockStore::new();
        let config = SessionConfig::new("default", "tcp");
        let target = Target::from("10.0.0.2");
        let cancel = CancellationToken::new();
        let ctx = JobContext::new(&config, &store, &target, &cancel);

        assert!(ctx.checkpoint().is_ok());
        cancel.cancel();
        assert!(matches!(ctx.checkpoint(), Err(PluginError::Cancelled)));
        assert!(ctx.run_module().is_ok());
    }
}
