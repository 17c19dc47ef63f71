//! Transport error types.

use thiserror::Error;

use crate::config::LimitsConfig;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The transport was given a request it cannot express.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The remote end violated the event-stream format.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Failed to serialize or deserialize a frame.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// A single event exceeded the configured maximum size.
    #[error(
        "Frame size ({size} bytes) exceeds maximum allowed ({max} bytes). \
         If this is expected, increase the limit with \
         `LimitsConfig {{ max_frame_size: Some({}) }}` or use `LimitsConfig::unlimited()`.",
        size
    )]
    FrameTooLarge {
        /// The actual size of the frame in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

/// Validates that an event payload does not exceed the configured limit.
///
/// # Returns
///
/// `Ok(())` if the size is within limits or no limit is set, otherwise `Err(TransportError::FrameTooLarge)`
pub fn validate_frame_size(size: usize, limits: &LimitsConfig) -> TransportResult<()> {
    if let Some(max_size) = limits.max_frame_size
        && size > max_size
    {
        return Err(TransportError::FrameTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}
