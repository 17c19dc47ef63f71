//! HTTP stream transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sselink_transport_traits::{LimitsConfig, TimeoutConfig, TlsConfig, duration_ms};

/// Retry policy for auto-reconnect
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Fixed interval between retries
    Fixed {
        /// Time interval between retry attempts
        #[serde(with = "duration_ms")]
        interval: Duration,
        /// Maximum number of retry attempts (None for unlimited)
        #[serde(default)]
        max_attempts: Option<u32>,
    },
    /// Exponential backoff
    Exponential {
        /// Base delay for exponential backoff calculation
        #[serde(with = "duration_ms")]
        base: Duration,
        /// Maximum delay between retry attempts
        #[serde(with = "duration_ms")]
        max_delay: Duration,
        /// Maximum number of retry attempts (None for unlimited)
        #[serde(default)]
        max_attempts: Option<u32>,
    },
    /// Never retry
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: Some(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before re-dial number `attempt` (1-based), or `None` when exhausted.
    pub(crate) fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                interval,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt > *max
                {
                    return None;
                }
                Some(*interval)
            }
            Self::Exponential {
                base,
                max_delay,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt > *max
                {
                    return None;
                }
                let exponent = attempt.saturating_sub(1).min(32);
                let base_delay = (base.as_millis() as u64).saturating_mul(1u64 << exponent);
                let max_delay_ms = max_delay.as_millis() as u64;
                let capped = base_delay.min(max_delay_ms);
                // ±25% jitter
                let jitter_range = capped / 4;
                let jitter_offset = if jitter_range > 0 {
                    let hash = u64::from(attempt)
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    hash % (jitter_range * 2)
                } else {
                    0
                };
                let final_delay = capped
                    .saturating_sub(jitter_range)
                    .saturating_add(jitter_offset);
                Some(Duration::from_millis(final_delay))
            }
            Self::Never => None,
        }
    }
}

/// HTTP event stream configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStreamConfig {
    /// Connect and read timeouts
    pub timeouts: TimeoutConfig,

    /// Auto-reconnect policy
    pub retry_policy: RetryPolicy,

    /// User agent string (set to None to disable User-Agent header)
    ///
    /// Default: `sselink/{version}`
    pub user_agent: Option<String>,

    /// Capacity of the frame channel between the connection task and the session
    pub frame_buffer: usize,

    /// Size limits for events and error bodies
    pub limits: LimitsConfig,

    /// TLS/HTTPS configuration
    pub tls: TlsConfig,
}

impl Default for HttpStreamConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            retry_policy: RetryPolicy::default(),
            user_agent: Some(format!("sselink/{}", env!("CARGO_PKG_VERSION"))),
            frame_buffer: 256,
            limits: LimitsConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl HttpStreamConfig {
    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the size limits.
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }
}
