//! Typed events delivered to listeners.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A message received on the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Event id, empty when the server sent none.
    pub id: String,
    /// Event type tag.
    pub event: String,
    /// Payload, passed through untouched.
    pub data: String,
}

/// Server-suggested delay before the next reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryNotice {
    /// Delay in milliseconds.
    pub retry_after_millis: u64,
}

/// A failure reported by the transport, rebuilt from its serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Failure message, verbatim.
    pub message: String,
    /// Stack trace or cause chain, verbatim.
    pub stack: Option<String>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// The response that accompanied a failed attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryResponse {
    /// HTTP status, `None` if it was missing or not a number.
    pub status: Option<u16>,
    /// Response body, if one was captured.
    pub body: Option<String>,
    /// Response headers.
    pub headers: HashMap<String, String>,
}

/// A failed attempt that the transport is about to retry.
///
/// `cause` and `response` are independent: either, both or neither may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryError {
    /// What went wrong, if the transport captured an error.
    pub cause: Option<RemoteError>,
    /// The rejected response, if the server answered.
    pub response: Option<RetryResponse>,
}

impl RetryError {
    /// Status of the rejected response, if any.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().and_then(|r| r.status)
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The stream was (re)established.
    Open,
    /// A message arrived.
    Message(Message),
    /// A comment line arrived.
    Comment(String),
    /// The server suggested a reconnect delay.
    RetryNotice(RetryNotice),
    /// An attempt failed.
    RetryError(RetryError),
    /// The transport is about to re-dial.
    Reconnecting,
    /// The transport gave up or was terminated.
    Closed,
}

impl SessionEvent {
    /// The listener category this event is delivered to, if any.
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Open => Some(Category::Open),
            Self::Message(_) => Some(Category::Message),
            Self::Comment(_) => Some(Category::Comment),
            Self::RetryNotice(_) => Some(Category::RetryNotice),
            Self::RetryError(_) => Some(Category::RetryError),
            Self::Closed => Some(Category::Closed),
            Self::Reconnecting => None,
        }
    }
}

/// The dispatch channel a listener is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Messages, optionally filtered by event type.
    Message,
    /// Comment lines.
    Comment,
    /// Stream (re)opened.
    Open,
    /// Stream closed.
    Closed,
    /// Server retry delay.
    RetryNotice,
    /// Failed attempts.
    RetryError,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Message => "message",
            Self::Comment => "comment",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::RetryNotice => "retry-notice",
            Self::RetryError => "retry-error",
        })
    }
}
