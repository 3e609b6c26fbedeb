use std::{collections::BTreeMap, fmt, sync::Arc};

use thiserror::Error;
use volley_contracts::{ModulePlugin, ProtocolPlugin};
use volley_model::ModuleInfo;

use crate::store::{StoreFactory, jsonl_store_factory};

pub type ProtocolFactory = Arc<dyn Fn() -> Box<dyn ProtocolPlugin> + Send + Sync>;
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn ModulePlugin> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Protocol,
    Module,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Protocol => f.write_str("protocol"),
            PluginKind::Module => f.write_str("module"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown {kind} '{name}'")]
    NotFound { kind: PluginKind, name: String },

    #[error("invalid {kind} '{name}': {reason}")]
    InvalidPlugin {
        kind: PluginKind,
        name: String,
        reason: String,
    },

    #[error("module '{module}' does not support protocol '{protocol}'")]
    Unsupported { module: String, protocol: String },
}

/// Protocol descriptor: the plugin factory plus the store it persists into.
#[derive(Clone)]
pub struct ProtocolRegistration {
    pub name: String,
    pub factory: ProtocolFactory,
    pub store: StoreFactory,
}

impl ProtocolRegistration {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ProtocolPlugin> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            store: jsonl_store_factory(),
        }
    }

    pub fn with_store(mut self, store: StoreFactory) -> Self {
        self.store = store;
        self
    }
}

impl fmt::Debug for ProtocolRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ModuleRegistration {
    pub factory: ModuleFactory,
}

impl ModuleRegistration {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn ModulePlugin> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for ModuleRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistration").finish_non_exhaustive()
    }
}

/// A fixed listing of plugin implementations scanned once at startup.
pub trait PluginSource {
    fn protocols(&self) -> Vec<ProtocolRegistration>;

    fn modules(&self) -> Vec<ModuleRegistration>;
}

/// Protocol handle produced by [`PluginRegistry::load_protocol`].
#[derive(Clone)]
pub struct LoadedProtocol {
    pub name: String,
    pub plugin: Arc<dyn ProtocolPlugin>,
    pub store: StoreFactory,
}

impl fmt::Debug for LoadedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedProtocol")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct ModuleEntry {
    info: ModuleInfo,
    factory: ModuleFactory,
}

/// Name-indexed, validated plugin handles.
///
/// Lookups are case-insensitive; listings keep the case each plugin declared.
/// The registry is immutable once discovered, so failed loads never change it.
pub struct PluginRegistry {
    protocols: BTreeMap<String, ProtocolRegistration>,
    modules: BTreeMap<String, ModuleEntry>,
    rejected: Vec<RegistryError>,
}

fn lookup_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl PluginRegistry {
    /// Scans `sources` in order. Invalid or duplicate plugins are skipped and kept in [`Self::rejected`].
    pub fn discover(sources: &[&dyn PluginSource]) -> Self {
        let mut registry = Self {
            protocols: BTreeMap::new(),
            modules: BTreeMap::new(),
            rejected: Vec::new(),
        };

        for source in sources {
            for registration in source.protocols() {
                if let Err(err) = registry.register_protocol(registration) {
                    tracing::warn!(target: "volley::registry", error = %err, "skipping protocol");
                    registry.rejected.push(err);
                }
            }
            for registration in source.modules() {
                if let Err(err) = registry.register_module(registration) {
                    tracing::warn!(target: "volley::registry", error = %err, "skipping module");
                    registry.rejected.push(err);
                }
            }
        }

        tracing::debug!(
            target: "volley::registry",
            protocols = registry.protocols.len(),
            modules = registry.modules.len(),
            rejected = registry.rejected.len(),
            "plugin discovery finished"
        );
        registry
    }

    fn register_protocol(&mut self, registration: ProtocolRegistration) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidPlugin {
            kind: PluginKind::Protocol,
            name: registration.name.clone(),
            reason: reason.to_string(),
        };

        let name = registration.name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(invalid("name must be a single non-empty word"));
        }
        let probe = (registration.factory)();
        if !probe.name().eq_ignore_ascii_case(name) {
            return Err(invalid(&format!(
                "plugin reports name '{}' but is registered as '{name}'",
                probe.name()
            )));
        }
        let key = lookup_key(name);
        if self.protocols.contains_key(&key) {
            return Err(invalid("a protocol with this name is already registered"));
        }

        self.protocols.insert(key, registration);
        Ok(())
    }

    fn register_module(&mut self, registration: ModuleRegistration) -> Result<(), RegistryError> {
        let info = (registration.factory)().info();
        let invalid = |reason: &str| RegistryError::InvalidPlugin {
            kind: PluginKind::Module,
            name: info.name.clone(),
            reason: reason.to_string(),
        };

        if info.name.trim().is_empty() {
            return Err(invalid("missing name"));
        }
        if info.description.trim().is_empty() {
            return Err(invalid("missing description"));
        }
        if info.options.iter().any(|option| option.name.trim().is_empty()) {
            return Err(invalid("option without a name"));
        }
        let caps = &info.capabilities;
        if caps.required_server.is_some() && !caps.requires_server {
            return Err(invalid("required_server is set but requires_server is false"));
        }
        let key = lookup_key(&info.name);
        if self.modules.contains_key(&key) {
            return Err(invalid("a module with this name is already registered"));
        }

        self.modules.insert(
            key,
            ModuleEntry {
                info,
                factory: registration.factory,
            },
        );
        Ok(())
    }

    /// Protocol descriptors keyed by declared name.
    pub fn list_protocols(&self) -> BTreeMap<&str, &ProtocolRegistration> {
        self.protocols
            .values()
            .map(|registration| (registration.name.as_str(), registration))
            .collect()
    }

    /// Module descriptors keyed by declared name.
    pub fn list_modules(&self) -> BTreeMap<&str, &ModuleInfo> {
        self.modules
            .values()
            .map(|entry| (entry.info.name.as_str(), &entry.info))
            .collect()
    }

    /// Modules that declare support for `protocol`.
    pub fn list_modules_for(&self, protocol: &str) -> BTreeMap<&str, &ModuleInfo> {
        self.modules
            .values()
            .filter(|entry| entry.info.supports_protocol(protocol))
            .map(|entry| (entry.info.name.as_str(), &entry.info))
            .collect()
    }

    pub fn module_info(&self, name: &str) -> Result<&ModuleInfo, RegistryError> {
        self.modules
            .get(&lookup_key(name))
            .map(|entry| &entry.info)
            .ok_or_else(|| RegistryError::NotFound {
                kind: PluginKind::Module,
                name: name.to_string(),
            })
    }

    pub fn load_protocol(&self, name: &str) -> Result<LoadedProtocol, RegistryError> {
        let registration =
            self.protocols
                .get(&lookup_key(name))
                .ok_or_else(|| RegistryError::NotFound {
                    kind: PluginKind::Protocol,
                    name: name.to_string(),
                })?;

        Ok(LoadedProtocol {
            name: registration.name.clone(),
            plugin: Arc::from((registration.factory)()),
            store: Arc::clone(&registration.store),
        })
    }

    /// Fresh module instance, ready for `configure`.
    pub fn load_module(&self, name: &str) -> Result<Box<dyn ModulePlugin>, RegistryError> {
        self.modules
            .get(&lookup_key(name))
            .map(|entry| (entry.factory)())
            .ok_or_else(|| RegistryError::NotFound {
                kind: PluginKind::Module,
                name: name.to_string(),
            })
    }

    /// Like [`Self::load_module`], rejecting modules that do not run on `protocol`.
    pub fn load_module_for(
        &self,
        name: &str,
        protocol: &str,
    ) -> Result<Box<dyn ModulePlugin>, RegistryError> {
        let info = self.module_info(name)?;
        if !info.supports_protocol(protocol) {
            return Err(RegistryError::Unsupported {
                module: info.name.clone(),
                protocol: protocol.to_string(),
            });
        }
        self.load_module(name)
    }

    /// Plugins skipped during discovery.
    pub fn rejected(&self) -> &[RegistryError] {
        &self.rejected
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("protocols", &self.protocols.keys().collect::<Vec<_>>())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("rejected", &self.rejected.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_contracts::{JobContext, PluginError};
    use volley_model::{ModuleCapabilities, ModuleOption, ServerKind};

    struct Named(&'static str);

    impl ProtocolPlugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _ctx: &JobContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    struct Described(ModuleInfo);

    impl ModulePlugin for Described {
        fn info(&self) -> ModuleInfo {
            self.0.clone()
        }
    }

    fn module_info(name: &str, description: &str) -> ModuleInfo {
        ModuleInfo {
            name: name.to_string(),
            description: description.to_string(),
            options: vec![ModuleOption::new("PATH", "where to listen")],
            supported_protocols: vec!["smb".to_string()],
            capabilities: ModuleCapabilities::default(),
        }
    }

    struct Fixture {
        protocols: Vec<&'static str>,
        modules: Vec<ModuleInfo>,
    }

    impl PluginSource for Fixture {
        fn protocols(&self) -> Vec<ProtocolRegistration> {
            self.protocols
                .iter()
                .map(|&name| ProtocolRegistration::new(name, move || Box::new(Named(name))))
                .collect()
        }

        fn modules(&self) -> Vec<ModuleRegistration> {
            self.modules
                .iter()
                .cloned()
                .map(|info| ModuleRegistration::new(move || Box::new(Described(info.clone()))))
                .collect()
        }
    }

    fn registry() -> PluginRegistry {
        let mut orphan_server = module_info("orphan", "declares a server kind only");
        orphan_server.capabilities.required_server = Some(ServerKind::Http);

        PluginRegistry::discover(&[&Fixture {
            protocols: vec!["smb", "SSH", "smb"],
            modules: vec![
                module_info("Mimikatz", "dumps credentials"),
                module_info("enum_shares", "lists shares"),
                module_info("", "nameless"),
                module_info("blank", "  "),
                orphan_server,
            ],
        }])
    }

    #[test]
    fn lookup_is_case_insensitive_and_listing_keeps_case() {
        let registry = registry();
        assert!(registry.load_protocol("ssh").is_ok());
        assert!(registry.load_protocol("SMB").is_ok());
        assert!(registry.load_module("MIMIKATZ").is_ok());

        let modules: Vec<_> = registry.list_modules().into_keys().collect();
        assert_eq!(modules, vec!["Mimikatz", "enum_shares"]);
        let protocols: Vec<_> = registry.list_protocols().into_keys().collect();
        assert_eq!(protocols, vec!["SSH", "smb"]);
    }

    #[test]
    fn unknown_names_are_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.load_module("foobar"),
            Err(RegistryError::NotFound { kind: PluginKind::Module, .. })
        ));
        assert!(matches!(
            registry.load_protocol("rdp"),
            Err(RegistryError::NotFound { kind: PluginKind::Protocol, .. })
        ));
    }

    #[test]
    fn invalid_and_duplicate_plugins_are_rejected_without_registration() {
        let registry = registry();
        assert_eq!(registry.rejected().len(), 4);
        assert!(registry.load_module("blank").is_err());
        assert!(registry.load_module("orphan").is_err());
        assert_eq!(registry.list_protocols().len(), 2);
    }

    #[test]
    fn module_must_support_the_protocol() {
        let registry = registry();
        assert!(registry.load_module_for("mimikatz", "SMB").is_ok());
        assert!(matches!(
            registry.load_module_for("mimikatz", "ssh"),
            Err(RegistryError::Unsupported { .. })
        ));
        assert_eq!(registry.list_modules_for("ssh").len(), 0);
        assert_eq!(registry.list_modules_for("smb").len(), 2);
    }

    #[test]
    fn mismatched_protocol_name_is_invalid() {
        struct Liar;
        impl PluginSource for Liar {
            fn protocols(&self) -> Vec<ProtocolRegistration> {
                vec![ProtocolRegistration::new("winrm", || Box::new(Named("ldap")))]
            }
            fn modules(&self) -> Vec<ModuleRegistration> {
                Vec::new()
            }
        }

        let registry = PluginRegistry::discover(&[&Liar]);
        assert!(registry.list_protocols().is_empty());
        assert!(matches!(
            registry.rejected(),
            [RegistryError::InvalidPlugin { kind: PluginKind::Protocol, .. }]
        ));
    }
}
