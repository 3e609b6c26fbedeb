use std::collections::BTreeMap;

use volley_model::ModuleInfo;

use crate::{
    callback::{CallbackContext, CallbackRequest, CallbackResponse},
    context::JobContext,
};

/// `-o KEY=VALUE` pairs handed to a module before the run starts.
pub type ModuleOptions = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("cancelled")]
    Cancelled,
}

impl PluginError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// The outbound check performed once per target.
///
/// `execute` runs on a pool thread and may block. Returning normally marks the
/// job successful; an error is recorded against that target only.
pub trait ProtocolPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, ctx: &JobContext<'_>) -> Result<(), PluginError>;
}

/// Optional task layered on a protocol, with capability flags and inbound hooks.
pub trait ModulePlugin: Send + Sync {
    fn info(&self) -> ModuleInfo;

    /// Applies operator options. Called once, before any job is dispatched.
    fn configure(&mut self, options: &ModuleOptions) -> Result<(), PluginError> {
        match options.keys().next() {
            Some(name) => Err(PluginError::InvalidOption {
                name: name.clone(),
                reason: "module takes no options".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Invoked by protocols once their check against a target succeeded.
    fn on_target(&self, _ctx: &JobContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Handles inbound callback traffic.
    fn on_request(&self, _ctx: &CallbackContext<'_>, _request: &CallbackRequest) -> CallbackResponse {
        CallbackResponse::not_found()
    }

    /// Whether `POST` callbacks carry results for [`ModulePlugin::on_response`].
    fn has_response(&self) -> bool {
        false
    }

    fn on_response(&self, _ctx: &CallbackContext<'_>, _request: &CallbackRequest) -> CallbackResponse {
        CallbackResponse::ok(Vec::new())
    }
}
