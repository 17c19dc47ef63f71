//! Error types for the session engine.

use sselink_transport_traits::TransportError;
use thiserror::Error;

use crate::config::ConfigError;

/// A specialized `Result` type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced synchronously by the session API.
///
/// Failures of the stream itself never appear here: they are delivered to
/// retry-error listeners while the transport keeps retrying.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    /// The connection parameters cannot be used to open a stream.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The transport refused the request outright.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Client configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Creates a [`SessionError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` for errors caused by bad caller input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Transport(TransportError::ConfigurationError(_))
        )
    }
}
