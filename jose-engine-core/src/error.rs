//! Error types for the jose-engine-core crate.
//!
//! The variants follow the failure classes a JOSE engine has to keep apart:
//! key format problems and structural problems are reported eagerly with a
//! message, while every cryptographic failure collapses into the single
//! [`Error::Cryptographic`] variant so that callers cannot tell a bad tag from
//! bad padding or an invalid point.

use thiserror::Error;

/// Error type for the JOSE engine
#[derive(Debug, Error)]
pub enum Error {
    /// The key has the wrong type or lacks a mandatory parameter
    #[error("Invalid key format: {0}")]
    KeyFormat(String),
    /// An `alg` or `enc` value has no registered implementation
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// A cryptographic check failed
    #[error("Cryptographic operation failed")]
    Cryptographic,
    /// The token or header is malformed
    #[error("Invalid structure: {0}")]
    Structural(String),
    /// The secure random source is unavailable
    #[error("Secure random number generator failure")]
    Randomness,
    /// The engine configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Serialization error
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Builds a [`Error::KeyFormat`] from anything printable.
    pub(crate) fn key_format(msg: impl Into<String>) -> Self {
        Self::KeyFormat(msg.into())
    }

    /// Builds a [`Error::Structural`] from anything printable.
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    /// Builds a [`Error::UnsupportedAlgorithm`] from anything printable.
    pub(crate) fn unsupported(name: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(name.into())
    }
}

/// Result type for the JOSE engine
pub type Result<T> = std::result::Result<T, Error>;
