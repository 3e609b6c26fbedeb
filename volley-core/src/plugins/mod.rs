//! Plugins compiled into the binary.

mod canary;
mod tcp;

pub use canary::Canary;
pub use tcp::{DEFAULT_PORT as TCP_DEFAULT_PORT, TcpProbe};

use crate::registry::{ModuleRegistration, PluginSource, ProtocolRegistration};

/// The built-in plugin listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPlugins;

impl PluginSource for BuiltinPlugins {
    fn protocols(&self) -> Vec<ProtocolRegistration> {
        vec![ProtocolRegistration::new(tcp::NAME, || Box::new(TcpProbe))]
    }

    fn modules(&self) -> Vec<ModuleRegistration> {
        vec![ModuleRegistration::new(|| Box::new(Canary::default()))]
    }
}
