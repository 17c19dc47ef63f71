//! Connection parameters for a session.

use std::collections::BTreeMap;

use sselink_transport_traits::StreamRequest;
use url::Url;

use crate::error::{Result, SessionError};

/// Where and how to open an event stream.
///
/// Maps are kept sorted so that parameters built in any order compare equal
/// and produce the same [`SessionKey`](crate::SessionKey).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectionParameters {
    url: String,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
}

impl ConnectionParameters {
    /// Parameters for `url` with no headers and no query.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Adds a request header. A repeated name replaces the earlier value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds several request headers.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Adds a query parameter. A repeated name replaces the earlier value.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds several query parameters.
    #[must_use]
    pub fn queries<I, K, V>(mut self, query: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(query.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The URL as given, without the query parameters applied.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers, sorted by name.
    pub fn header_map(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Query parameters, sorted by name.
    pub fn query_map(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// The URL with the query parameters appended.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the URL does not parse or
    /// is not `http`/`https`.
    pub fn resolved_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| SessionError::configuration(format!("invalid url {:?}: {e}", self.url)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(SessionError::configuration(format!(
                "unsupported url scheme {:?}",
                url.scheme()
            )));
        }
        if url.cannot_be_a_base() || url.host().is_none() {
            return Err(SessionError::configuration(format!(
                "url {:?} has no host",
                self.url
            )));
        }

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }

    /// Validates the parameters and builds the transport request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] for an unusable URL or a header
    /// name or value that cannot be sent.
    pub fn to_request(&self) -> Result<StreamRequest> {
        let url = self.resolved_url()?;

        for (name, value) in &self.headers {
            if name.is_empty() || !name.bytes().all(is_token_byte) {
                return Err(SessionError::configuration(format!(
                    "invalid header name {name:?}"
                )));
            }
            if !value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b)) {
                return Err(SessionError::configuration(format!(
                    "invalid value for header {name:?}"
                )));
            }
        }

        Ok(StreamRequest {
            url: url.into(),
            headers: self.headers.clone(),
        })
    }
}

// RFC 9110 token characters
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
