use std::{fmt, path::PathBuf, str::FromStr};

use crate::error::{ModelError, Result};

/// Transport a callback listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ServerKind {
    Http,
    #[default]
    Https,
    Smb,
}

impl ServerKind {
    pub const ALL: [ServerKind; 3] = [ServerKind::Http, ServerKind::Https, ServerKind::Smb];

    /// Well-known port used when the operator does not pick one.
    pub const fn default_port(self) -> u16 {
        match self {
            ServerKind::Http => 80,
            ServerKind::Https => 443,
            ServerKind::Smb => 445,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ServerKind::Http => "http",
            ServerKind::Https => "https",
            ServerKind::Smb => "smb",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ServerKind::Http),
            "https" => Ok(ServerKind::Https),
            "smb" => Ok(ServerKind::Smb),
            other => Err(ModelError::InvalidServerKind(other.to_string())),
        }
    }
}

/// PEM certificate and key used by the https transport.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Where the callback listener binds when a module needs one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerBinding {
    pub host: String,
    /// `None` falls back to the kind's well-known port. `Some(0)` asks the OS for an ephemeral port.
    pub port: Option<u16>,
    pub kind: ServerKind,
    pub tls: Option<TlsPaths>,
}

impl Default for ServerBinding {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: None,
            kind: ServerKind::default(),
            tls: None,
        }
    }
}

impl ServerBinding {
    pub fn effective_port(&self) -> u16 {
        self.effective_port_for(self.kind)
    }

    /// Port to bind when a module overrides the configured transport.
    pub fn effective_port_for(&self, kind: ServerKind) -> u16 {
        self.port.unwrap_or_else(|| kind.default_port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_follow_kind() {
        assert_eq!(ServerKind::Http.default_port(), 80);
        assert_eq!(ServerKind::Https.default_port(), 443);
        assert_eq!(ServerKind::Smb.default_port(), 445);
    }

    #[test]
    fn explicit_port_wins_over_kind_default() {
        let binding = ServerBinding {
            port: Some(8080),
            ..ServerBinding::default()
        };
        assert_eq!(binding.effective_port_for(ServerKind::Smb), 8080);

        let binding = ServerBinding::default();
        assert_eq!(binding.effective_port_for(ServerKind::Http), 80);
    }

    #[test]
    fn parses_kind_case_insensitively() {
        assert_eq!("HTTP".parse::<ServerKind>().unwrap(), ServerKind::Http);
        assert_eq!(" smb ".parse::<ServerKind>().unwrap(), ServerKind::Smb);
        assert!(matches!(
            "ftp".parse::<ServerKind>(),
            Err(ModelError::InvalidServerKind(_))
        ));
    }
}
