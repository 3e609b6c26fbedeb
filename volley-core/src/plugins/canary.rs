use serde_json::json;
use volley_contracts::{
    CallbackContext, CallbackRequest, CallbackResponse, JobContext, ModuleOptions, ModulePlugin,
    PluginError,
};
use volley_model::{ModuleCapabilities, ModuleInfo, ModuleOption, ServerKind};

const DEFAULT_PATH: &str = "/canary";

/// Hands each reachable target a unique callback URL and records who calls it.
#[derive(Debug, Clone)]
pub struct Canary {
    path: String,
}

impl Default for Canary {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl Canary {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Target named by a hit on `<path>/<target>`; bare `<path>` hits fall back to the peer.
    fn origin_of(&self, request: &CallbackRequest) -> Option<String> {
        let rest = request.path.as_deref()?.strip_prefix(self.path.as_str())?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        let named = rest.trim_matches('/');
        Some(if named.is_empty() {
            request.peer.ip().to_string()
        } else {
            named.to_string()
        })
    }
}

impl ModulePlugin for Canary {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "canary".to_string(),
            description: "Plants a per-target callback URL and records inbound hits".to_string(),
            options: vec![ModuleOption::new(
                "PATH",
                "URL path prefix served by the callback server (default: /canary)",
            )],
            supported_protocols: vec!["tcp".to_string()],
            capabilities: ModuleCapabilities {
                opsec_safe: true,
                multiple_hosts: true,
                requires_server: true,
                required_server: Some(ServerKind::Http),
            },
        }
    }

    fn configure(&mut self, options: &ModuleOptions) -> Result<(), PluginError> {
        for (name, value) in options {
            if !name.eq_ignore_ascii_case("PATH") {
                return Err(PluginError::InvalidOption {
                    name: name.clone(),
                    reason: "unknown option".to_string(),
                });
            }
            let value = value.trim().trim_end_matches('/');
            if value.is_empty() {
                return Err(PluginError::InvalidOption {
                    name: name.clone(),
                    reason: "path must not be empty".to_string(),
                });
            }
            self.path = if value.starts_with('/') {
                value.to_string()
            } else {
                format!("/{value}")
            };
        }
        Ok(())
    }

    fn on_target(&self, ctx: &JobContext<'_>) -> Result<(), PluginError> {
        let base = ctx
            .callback_url()
            .ok_or_else(|| PluginError::failed("canary needs a running callback server"))?;
        let url = format!("{base}{}/{}", self.path, ctx.target());
        tracing::info!(target: "volley::canary", host = %ctx.target(), url = %url, "canary planted");
        ctx.record("canary_url", json!({ "url": url }));
        Ok(())
    }

    fn on_request(&self, ctx: &CallbackContext<'_>, request: &CallbackRequest) -> CallbackResponse {
        let Some(origin) = self.origin_of(request) else {
            return CallbackResponse::not_found();
        };
        tracing::info!(target: "volley::canary", host = %origin, peer = %request.peer, "canary hit");
        ctx.record(
            &origin,
            "canary_hit",
            json!({
                "peer": request.peer.to_string(),
                "method": request.method,
                "path": request.path,
            }),
        );
        CallbackResponse::ok("ok").with_header("content-type", "text/plain")
    }
}
