//! Trait surfaces shared by the orchestrator and the plugins it drives.
//!
//! Protocol and module plugins are synchronous: the orchestrator runs them on a
//! bounded pool of OS threads and bridges back to the async scheduler itself.
//! The persistence store is the only shared mutable resource a job touches, so
//! its writes are synchronous and internally serialized while its shutdown is
//! async.
#![allow(missing_docs)]

pub mod callback;
pub mod context;
pub mod plugin;
pub mod store;

pub use callback::{CallbackContext, CallbackRequest, CallbackResponse};
pub use context::JobContext;
pub use plugin::{ModulePlugin, ModuleOptions, PluginError, ProtocolPlugin};
pub use store::{HostRecord, PersistenceError, PersistenceStore};
