//! Classification of raw transport frames.

use sselink_transport_traits::{FrameKind, RawFrame, RawStatus, ResponsePayload, ThrowablePayload};
use thiserror::Error;

use crate::event::{Message, RemoteError, RetryError, RetryNotice, RetryResponse, SessionEvent};

/// A frame that could not be classified. Logged and dropped, never surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeAnomaly {
    /// The frame kind is not one this engine understands.
    #[error("unknown frame kind")]
    UnknownKind,

    /// A retry-time frame carried no usable delay.
    #[error("retry-time frame without a delay")]
    MissingRetryDelay,

    /// A serialized frame was not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Turns [`RawFrame`]s into [`SessionEvent`]s.
///
/// Decoding is lenient: missing message fields become empty strings, and a
/// retry error keeps whatever parts of its payload are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDecoder;

impl EventDecoder {
    /// Classifies one frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeAnomaly`] for frames with an unknown kind or a
    /// retry-time frame without a delay.
    pub fn decode(frame: RawFrame) -> Result<SessionEvent, DecodeAnomaly> {
        match frame.kind {
            FrameKind::Open => Ok(SessionEvent::Open),
            FrameKind::Closed => Ok(SessionEvent::Closed),
            FrameKind::PreRetry => Ok(SessionEvent::Reconnecting),
            FrameKind::Message => Ok(SessionEvent::Message(Message {
                id: frame.id.unwrap_or_default(),
                event: frame.event.unwrap_or_default(),
                data: frame.data.unwrap_or_default(),
            })),
            FrameKind::Comment => Ok(SessionEvent::Comment(frame.data.unwrap_or_default())),
            FrameKind::RetryTime => frame
                .retry_after_millis
                .or_else(|| frame.data.as_deref().and_then(|d| d.trim().parse().ok()))
                .map(|retry_after_millis| SessionEvent::RetryNotice(RetryNotice { retry_after_millis }))
                .ok_or(DecodeAnomaly::MissingRetryDelay),
            FrameKind::RetryError => Ok(SessionEvent::RetryError(RetryError {
                cause: frame.throwable.map(decode_cause),
                response: frame.response.map(decode_response),
            })),
            _ => Err(DecodeAnomaly::UnknownKind),
        }
    }

    /// Parses a JSON-serialized frame and classifies it.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeAnomaly::Malformed`] if `text` is not a frame record,
    /// otherwise as [`decode`](Self::decode).
    pub fn decode_json(text: &str) -> Result<SessionEvent, DecodeAnomaly> {
        let frame = RawFrame::from_json(text).map_err(|e| DecodeAnomaly::Malformed(e.to_string()))?;
        Self::decode(frame)
    }
}

fn decode_cause(throwable: ThrowablePayload) -> RemoteError {
    RemoteError {
        message: throwable.message.unwrap_or_default(),
        stack: throwable.stack_trace,
    }
}

fn decode_response(response: ResponsePayload) -> RetryResponse {
    RetryResponse {
        status: response.status.as_ref().and_then(coerce_status),
        body: response.body,
        headers: response.headers.unwrap_or_default(),
    }
}

/// Numeric coercion of a status that may arrive as text, e.g. `"503"` or `" 503 "`.
fn coerce_status(status: &RawStatus) -> Option<u16> {
    match status {
        RawStatus::Code(code) => u16::try_from(*code).ok(),
        RawStatus::Text(text) => {
            let text = text.trim();
            text.parse::<u16>().ok().or_else(|| {
                let value = text.parse::<f64>().ok()?;
                (value.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&value))
                    .then_some(value as u16)
            })
        }
    }
}
