//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid configuration, descriptor, or launch artifact.
    /// Fatal: raised before the child is launched.
    Config(String),
    /// The child process could not be spawned.
    Launch(String),
    /// A control endpoint was unreachable or refused the connection.
    ///
    /// Recoverable: it usually means the target has already exited.
    ControlConnection(String),
    /// Transport failure during a control exchange after connecting.
    Ipc(String),
    /// The platform artifact could not be resolved.
    Resolution(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the error is an expected condition that callers may log and
    /// move past without aborting the surrounding operation.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ControlConnection(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::ControlConnection(msg) => write!(f, "control connection: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Resolution(msg) => write!(f, "resolution: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
