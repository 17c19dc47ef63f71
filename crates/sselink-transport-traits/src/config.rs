//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum TLS protocol version.
///
/// Only TLS 1.3 is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TlsVersion {
    /// TLS 1.3 protocol version (required).
    #[default]
    Tls13,
}

/// TLS/HTTPS configuration for secure stream connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Minimum TLS protocol version to accept.
    pub min_version: TlsVersion,

    /// Whether to validate server certificates.
    pub validate_certificates: bool,

    /// Custom CA certificates to trust (PEM or DER format).
    pub custom_ca_certs: Option<Vec<Vec<u8>>>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::default(),
            validate_certificates: true,
            custom_ca_certs: None,
        }
    }
}

impl TlsConfig {
    /// Create an insecure TLS configuration that skips certificate validation.
    ///
    /// **Warning**: This configuration is insecure and should ONLY be used in testing.
    #[must_use]
    pub const fn insecure() -> Self {
        Self {
            min_version: TlsVersion::Tls13,
            validate_certificates: false,
            custom_ca_certs: None,
        }
    }

    /// Check if this configuration is insecure (skips certificate validation).
    #[must_use]
    pub const fn is_insecure(&self) -> bool {
        !self.validate_certificates
    }
}

/// Size limits applied to inbound events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a single event's data in bytes.
    /// `None` = unlimited
    pub max_frame_size: Option<usize>,

    /// Maximum size of an error response body captured for a retry error.
    /// Longer bodies are truncated.
    pub max_error_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_size: Some(1024 * 1024), // 1MB
            max_error_body_size: 64 * 1024,    // 64KB
        }
    }
}

impl LimitsConfig {
    /// Create a configuration with no frame limit.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_frame_size: None,
            max_error_body_size: usize::MAX,
        }
    }
}

/// Timeouts for establishing and reading an event stream.
///
/// There is no total timeout: an event stream is expected to stay open.
/// Durations are written in milliseconds in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    #[serde(with = "duration_ms")]
    pub connect: Duration,

    /// Maximum silence between two chunks before the stream is considered dead.
    /// `None` = no timeout
    #[serde(with = "duration_ms::option")]
    pub read: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read: Some(Duration::from_secs(300)),
        }
    }
}

impl TimeoutConfig {
    /// Create a configuration with short timeouts, mostly useful in tests.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Some(Duration::from_secs(5)),
        }
    }

    /// Create a configuration that never times out a quiet stream.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read: None,
        }
    }
}

/// Serde helpers that write a [`Duration`] as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as milliseconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    /// Deserializes a duration from milliseconds.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// The same for `Option<Duration>`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        /// Serializes an optional duration as milliseconds.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserializes an optional duration from milliseconds.
        ///
        /// # Errors
        ///
        /// Fails if the value is neither null nor an unsigned integer.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
