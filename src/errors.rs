//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// REST request failed at the network layer or returned a non-success status.
    Http(String),
    /// A response body or push payload could not be decoded.
    Decode(String),
    /// Push socket could not be opened, closed unexpectedly, or errored.
    Transport(String),
    /// Push session protocol failure (STOMP `ERROR` frame or malformed frame).
    Protocol(String),
    /// Bearer credential could not be retrieved.
    Credential(String),
    /// Caller supplied an operation the layer does not recognize.
    InvalidAction(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Credential(msg) => write!(f, "credential: {msg}"),
            Self::InvalidAction(msg) => write!(f, "invalid action: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Prefix the message with `context`, keeping the variant.
    #[must_use]
    pub fn context(self, context: impl Display) -> Self {
        match self {
            Self::Config(msg) => Self::Config(format!("{context}: {msg}")),
            Self::Http(msg) => Self::Http(format!("{context}: {msg}")),
            Self::Decode(msg) => Self::Decode(format!("{context}: {msg}")),
            Self::Transport(msg) => Self::Transport(format!("{context}: {msg}")),
            Self::Protocol(msg) => Self::Protocol(format!("{context}: {msg}")),
            Self::Credential(msg) => Self::Credential(format!("{context}: {msg}")),
            Self::InvalidAction(msg) => Self::InvalidAction(format!("{context}: {msg}")),
            Self::NotFound(msg) => Self::NotFound(format!("{context}: {msg}")),
            Self::Io(msg) => Self::Io(format!("{context}: {msg}")),
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
