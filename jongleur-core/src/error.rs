//! Error types for Jongleur Core.

use thiserror::Error;

/// Core error type for ring and endpoint construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A ring was requested for an empty endpoint sequence.
    #[error("attempt to create an empty ring")]
    EmptyRing,

    /// An endpoint address was empty.
    #[error("endpoint address is empty")]
    EmptyEndpoint,
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
