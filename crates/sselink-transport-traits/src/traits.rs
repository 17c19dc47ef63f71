//! Core transport traits.

use std::collections::BTreeMap;

use crate::error::TransportResult;
use crate::stream::StreamHandle;

/// Everything a transport needs to open one event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Absolute URL with the query string already applied.
    pub url: String,
    /// Request headers, sent as given.
    pub headers: BTreeMap<String, String>,
}

impl StreamRequest {
    /// Creates a request with no extra headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A transport that can open a long-lived event stream.
///
/// The transport owns reconnect policy and backoff: once established, it keeps
/// the stream alive on its own and reports every open, message, failure and
/// re-dial as a frame through the returned [`StreamHandle`].
pub trait StreamTransport: Send + Sync + std::fmt::Debug {
    /// Starts streaming `request`.
    ///
    /// Must not block: implementations spawn their connection task and return
    /// immediately. Network failures are reported as frames, never from here.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConfigurationError`](crate::TransportError::ConfigurationError)
    /// when the request cannot be expressed by this transport at all.
    fn establish(&self, request: StreamRequest) -> TransportResult<StreamHandle>;

    /// A short name used in logs.
    fn name(&self) -> &'static str {
        "stream"
    }
}
