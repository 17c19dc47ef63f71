//! Logging initialization.
//!
//! The session engine only emits `tracing` events; installing a subscriber is
//! left to the application. [`LoggingConfig::init`] installs a stderr
//! subscriber for applications that have no logging setup of their own.
//!
//! ```rust,no_run
//! use sselink::LoggingConfig;
//!
//! LoggingConfig::default().init()?;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set, e.g. `info` or `sselink=debug`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a configuration with `level` as the default filter.
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Installs a global subscriber writing to stderr.
    ///
    /// `RUST_LOG` takes precedence over [`level`](Self::level).
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(&self) -> io::Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let subscriber = tracing_subscriber::registry().with(filter);
        let layer = fmt::layer().with_writer(io::stderr).with_ansi(self.ansi);

        let result = match self.format {
            LogFormat::Pretty => subscriber.with(layer.pretty()).try_init(),
            LogFormat::Compact => subscriber.with(layer.compact()).try_init(),
            LogFormat::Json => subscriber.with(layer.json()).try_init(),
        };
        result.map_err(|e| io::Error::other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.ansi);
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::with_level("warn");
        // The first call may already have happened in another test
        let _ = config.init();
        assert!(config.init().is_err());
    }

    #[test]
    fn test_format_serde() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"format": "pretty", "ansi": true}"#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.ansi);
        assert_eq!(config.level, "info");
    }
}
