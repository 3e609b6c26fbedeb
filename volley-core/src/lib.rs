//! Scan orchestration engine.
//!
//! A run resolves a protocol (and optionally a module) through the
//! [`PluginRegistry`], starts a [`CallbackServer`] when the module asks for
//! one, and hands one [`Job`] per target to the [`ScanOrchestrator`]. Protocol
//! code is blocking and runs on a fixed [`WorkerPool`]; jitter, timeouts and
//! cancellation are handled on the async side. Teardown of the progress
//! monitor, store, callback server and pool happens once, in that order.
#![allow(missing_docs)]

pub mod callback;
pub mod error;
pub mod gate;
pub mod jitter;
pub mod orchestrator;
pub mod plugins;
pub mod pool;
pub mod progress;
pub mod registry;
pub mod session;
pub mod store;

pub use callback::{CallbackError, CallbackHandle, CallbackServer, CallbackState};
pub use error::{OrchestratorError, Result};
pub use gate::{Prompt, preflight_prompts};
pub use jitter::JitterSource;
pub use orchestrator::{Job, ScanOrchestrator};
pub use plugins::BuiltinPlugins;
pub use pool::WorkerPool;
pub use progress::{ProgressMonitor, ProgressSink, ProgressTracker};
pub use registry::{
    LoadedProtocol, ModuleRegistration, PluginKind, PluginRegistry, PluginSource,
    ProtocolRegistration, RegistryError,
};
pub use session::{ModuleSelection, RunControls, ScanSession};
pub use store::{JsonlStore, MemoryStore, StoreFactory, StoreSpec};

/// Registry holding the plugins compiled into this crate.
pub fn builtin_registry() -> PluginRegistry {
    PluginRegistry::discover(&[&BuiltinPlugins])
}
