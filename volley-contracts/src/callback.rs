use std::net::SocketAddr;

use volley_model::{ServerKind, SessionConfig};

use crate::store::{HostRecord, PersistenceStore};

/// Inbound connection handed to a module by the callback server.
///
/// The http transports fill in `method`, `path` and `headers`; the raw smb
/// transport only carries the initial payload in `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub peer: SocketAddr,
    pub kind: ServerKind,
    pub method: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CallbackRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CallbackResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Session handles available to module hooks while serving a callback.
pub struct CallbackContext<'a> {
    config: &'a SessionConfig,
    store: &'a dyn PersistenceStore,
}

impl<'a> CallbackContext<'a> {
    pub fn new(config: &'a SessionConfig, store: &'a dyn PersistenceStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &SessionConfig {
        self.config
    }

    pub fn store(&self) -> &dyn PersistenceStore {
        self.store
    }

    /// Stores an observation about `target`; store failures are logged, not returned.
    pub fn record(&self, target: &str, kind: &str, data: serde_json::Value) {
        let record = HostRecord::new(self.config.protocol.clone(), target, kind, data);
        if let Err(err) = self.store.record(record) {
            tracing::warn!(target: "volley::store", host = %target, kind, error = %err, "dropping callback record");
        }
    }
}

impl std::fmt::Debug for CallbackContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackContext")
            .field("workspace", &self.config.workspace)
            .field("protocol", &self.config.protocol)
            .finish_non_exhaustive()
    }
}
