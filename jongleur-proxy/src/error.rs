//! Error types for the proxy engine.

use thiserror::Error;

/// Proxy error type.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Invalid or missing configuration; the caller should print usage help.
    #[error("{0}")]
    Usage(String),

    /// The listener could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// The listen address as configured.
        addr: String,
        /// The underlying bind error.
        #[source]
        source: std::io::Error,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Build a usage error from a message.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Whether this error was caused by invalid configuration.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
