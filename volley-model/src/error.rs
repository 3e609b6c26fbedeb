use std::fmt::{self, Display};

/// Errors produced by model constructors and parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidJitter(String),
    InvalidServerKind(String),
    EmptyTarget,
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidJitter(msg) => write!(f, "invalid jitter: {msg}"),
            ModelError::InvalidServerKind(kind) => {
                write!(f, "invalid server kind '{kind}' (expected http, https or smb)")
            }
            ModelError::EmptyTarget => write!(f, "target identifier is empty"),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
