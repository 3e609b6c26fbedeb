//! Optional listener that hands inbound connections to the loaded module.

mod http;
mod raw;

use std::{fmt, io, net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use volley_contracts::{
    CallbackContext, CallbackRequest, CallbackResponse, ModulePlugin, PersistenceStore,
};
use volley_model::{ServerBinding, ServerKind, SessionConfig};

const STOP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("https callback server needs tls_cert and tls_key")]
    MissingTls,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// What the transports share: the module hooks and the session they run in.
#[derive(Clone)]
pub struct CallbackState {
    module: Arc<dyn ModulePlugin>,
    config: Arc<SessionConfig>,
    store: Arc<dyn PersistenceStore>,
}

impl CallbackState {
    pub fn new(
        module: Arc<dyn ModulePlugin>,
        config: Arc<SessionConfig>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        Self {
            module,
            config,
            store,
        }
    }

    /// Routes a request to `on_response` for result-carrying `POST`s, `on_request` otherwise.
    pub fn handle(&self, request: &CallbackRequest) -> CallbackResponse {
        let ctx = CallbackContext::new(&self.config, self.store.as_ref());
        let is_post = request
            .method
            .as_deref()
            .is_some_and(|method| method.eq_ignore_ascii_case("POST"));

        tracing::debug!(
            target: "volley::callback",
            peer = %request.peer,
            kind = %request.kind,
            path = request.path.as_deref().unwrap_or("-"),
            "callback received"
        );

        if is_post && self.module.has_response() {
            self.module.on_response(&ctx, request)
        } else {
            self.module.on_request(&ctx, request)
        }
    }
}

impl fmt::Debug for CallbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackState")
            .field("module", &self.module.info().name)
            .field("protocol", &self.config.protocol)
            .finish_non_exhaustive()
    }
}

/// Starts callback listeners.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackServer;

impl CallbackServer {
    /// Binds `kind` on the configured host and port and starts serving.
    ///
    /// Returns once the listener accepts connections, so jobs dispatched after
    /// this call can rely on it. Without an explicit port the kind's
    /// well-known port is used.
    pub async fn start(
        state: CallbackState,
        binding: &ServerBinding,
        kind: ServerKind,
    ) -> Result<CallbackHandle, CallbackError> {
        let port = binding.effective_port_for(kind);
        let host = binding.host.as_str();

        let handle = match kind {
            ServerKind::Http => http::serve_plain(state, host, port).await?,
            ServerKind::Https => {
                let tls = binding.tls.as_ref().ok_or(CallbackError::MissingTls)?;
                http::serve_tls(state, host, port, tls).await?
            }
            ServerKind::Smb => raw::serve(state, host, port).await?,
        };

        tracing::info!(
            target: "volley::callback",
            kind = %kind,
            addr = %handle.local_addr(),
            "callback server listening"
        );
        Ok(handle)
    }
}

/// A running callback listener.
pub struct CallbackHandle {
    kind: ServerKind,
    host: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallbackHandle {
    fn new(
        kind: ServerKind,
        host: &str,
        local_addr: SocketAddr,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            kind,
            host: host.to_string(),
            local_addr,
            shutdown,
            task: Some(task),
        }
    }

    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL targets are told to call back to.
    pub fn endpoint(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("{}://{}:{}", self.kind, host, self.local_addr.port())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Shuts the listener down and releases its port.
    ///
    /// Returns `true` if this call stopped the server, `false` if it was
    /// already stopped.
    pub async fn stop(&mut self) -> bool {
        let Some(mut task) = self.task.take() else {
            return false;
        };
        self.shutdown.cancel();

        match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(target: "volley::callback", error = %err, "callback server task failed")
            }
            Err(_) => {
                tracing::warn!(target: "volley::callback", "callback server did not stop in time, aborting");
                task.abort();
            }
        }
        tracing::info!(target: "volley::callback", kind = %self.kind, addr = %self.local_addr, "callback server stopped");
        true
    }
}

impl Drop for CallbackHandle {
    /// Signals the server to shut down if it was never stopped.
    fn drop(&mut self) {
        if self.task.take().is_some() {
            self.shutdown.cancel();
        }
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("kind", &self.kind)
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

fn bind_error(host: &str, port: u16, source: io::Error) -> CallbackError {
    CallbackError::Bind {
        addr: format!("{host}:{port}"),
        source,
    }
}

fn internal_error() -> CallbackResponse {
    CallbackResponse {
        status: 500,
        headers: Vec::new(),
        body: b"internal error".to_vec(),
    }
}

/// Runs the module hook off the async workers; module code may block.
async fn dispatch(state: Arc<CallbackState>, request: CallbackRequest) -> CallbackResponse {
    match tokio::task::spawn_blocking(move || state.handle(&request)).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(target: "volley::callback", error = %err, "module callback hook failed");
            internal_error()
        }
    }
}
