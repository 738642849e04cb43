use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the relay itself (misuse and configuration)
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid argument `{0}`: {1}")]
    InvalidArgument(&'static str, String),

    #[error("invalid relay configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by the host runtime or its driver
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DbError {
    /// The operation was canceled before it completed
    #[error("operation was canceled")]
    Canceled,

    #[error("{0}")]
    Driver(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("object has been disposed: {0}")]
    Disposed(&'static str),
}

impl DbError {
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }
}
