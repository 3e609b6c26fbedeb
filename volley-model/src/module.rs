use crate::server::ServerKind;

/// A single `KEY` a module accepts through `-o KEY=VALUE`, with its help line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleOption {
    pub name: String,
    pub help: String,
}

impl ModuleOption {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
        }
    }
}

/// Capability flags a module declares when it is loaded.
///
/// The defaults are the values that force operator confirmation: a module that
/// does not say it is opsec safe, or that it makes sense across many hosts, is
/// treated as if it is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleCapabilities {
    pub opsec_safe: bool,
    pub multiple_hosts: bool,
    pub requires_server: bool,
    /// Only meaningful when `requires_server` is set.
    pub required_server: Option<ServerKind>,
}

impl ModuleCapabilities {
    /// Transport the callback listener must speak, if the module needs one.
    ///
    /// Modules that need a server without pinning a transport get the
    /// session's configured kind.
    pub fn server_kind(&self, configured: ServerKind) -> Option<ServerKind> {
        self.requires_server
            .then(|| self.required_server.unwrap_or(configured))
    }
}

/// Static description of a module plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    /// Ordered option help shown by `--options`.
    pub options: Vec<ModuleOption>,
    /// Protocol names this module can run on top of.
    pub supported_protocols: Vec<String>,
    pub capabilities: ModuleCapabilities,
}

impl ModuleInfo {
    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.supported_protocols
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(protocol))
    }

    /// Option help rendered one option per line, in declaration order.
    pub fn options_help(&self) -> String {
        if self.options.is_empty() {
            return "No options available".to_string();
        }
        self.options
            .iter()
            .map(|option| format!("{:<16} {}", option.name, option.help))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities_require_confirmation_and_no_server() {
        let caps = ModuleCapabilities::default();
        assert!(!caps.opsec_safe);
        assert!(!caps.multiple_hosts);
        assert!(!caps.requires_server);
        assert_eq!(caps.required_server, None);
        assert_eq!(caps.server_kind(ServerKind::Https), None);
    }

    #[test]
    fn server_kind_falls_back_to_configured_transport() {
        let caps = ModuleCapabilities {
            requires_server: true,
            ..ModuleCapabilities::default()
        };
        assert_eq!(caps.server_kind(ServerKind::Smb), Some(ServerKind::Smb));

        let pinned = ModuleCapabilities {
            requires_server: true,
            required_server: Some(ServerKind::Http),
            ..ModuleCapabilities::default()
        };
        assert_eq!(pinned.server_kind(ServerKind::Smb), Some(ServerKind::Http));
    }

    #[test]
    fn options_help_keeps_declaration_order() {
        let info = ModuleInfo {
            name: "demo".into(),
            description: "demo module".into(),
            options: vec![
                ModuleOption::new("PATH", "callback path"),
                ModuleOption::new("DELAY", "seconds to wait"),
            ],
            supported_protocols: vec!["tcp".into()],
            capabilities: ModuleCapabilities::default(),
        };
        let help = info.options_help();
        let path_at = help.find("PATH").unwrap();
        let delay_at = help.find("DELAY").unwrap();
        assert!(path_at < delay_at);
        assert!(info.supports_protocol("TCP"));
    }
}
