//! Core data model definitions shared across Volley crates.
#![allow(missing_docs)]

pub mod error;
pub mod jitter;
pub mod module;
pub mod outcome;
pub mod progress;
pub mod server;
pub mod session;
pub mod target;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use jitter::JitterWindow;
pub use module::{ModuleCapabilities, ModuleInfo, ModuleOption};
pub use outcome::{JobOutcome, JobReport, OutcomeSummary, RunReport};
pub use progress::ProgressSnapshot;
pub use server::{ServerBinding, ServerKind, TlsPaths};
pub use session::SessionConfig;
pub use target::Target;
