//! Volley configuration: `volley.toml` plus environment loading, guard rails,
//! first-run bootstrap of the home directory, and target list expansion.
//!
//! Precedence is CLI flags (applied by the caller) over environment over file
//! over built-in defaults.
#![allow(missing_docs)]

pub mod bootstrap;
pub mod loader;
pub mod models;
pub mod sources;
pub mod targets;
pub mod validation;

pub use bootstrap::{
    BootstrapReport, CONFIG_FILE_NAME, DEFAULT_CONFIG_TOML, ensure_home, ensure_workspace,
};
pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{Config, ConfigMetadata, DEFAULT_WORKSPACE, GeneralConfig, ScanConfig};
pub use sources::{EnvConfig, FileConfig};
pub use targets::{TargetError, expand, resolve};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings, apply_guard_rails};
