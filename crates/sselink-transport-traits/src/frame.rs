//! The raw frame record exchanged between a transport and the session engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened on the stream.
///
/// Serialized in the same upper-case form the native bridges use
/// (`"OPEN"`, `"MESSAGE"`, `"RETRY_ERROR"`, ...). Unrecognised kinds
/// deserialize to [`FrameKind::Unknown`] instead of failing the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameKind {
    /// The stream was (re-)established.
    Open,
    /// A dispatched server event.
    Message,
    /// A comment line (`: ...`), typically a keep-alive.
    Comment,
    /// The server sent a `retry:` directive.
    RetryTime,
    /// A delivery attempt failed and the transport is about to retry.
    RetryError,
    /// The transport is about to re-dial.
    PreRetry,
    /// The transport stopped for good.
    Closed,
    /// Anything this version does not understand.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Message => write!(f, "MESSAGE"),
            Self::Comment => write!(f, "COMMENT"),
            Self::RetryTime => write!(f, "RETRY_TIME"),
            Self::RetryError => write!(f, "RETRY_ERROR"),
            Self::PreRetry => write!(f, "PRE_RETRY"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A serialized failure as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowablePayload {
    /// The failure message.
    #[serde(default, deserialize_with = "lenient::text")]
    pub message: Option<String>,
    /// A rendered stack trace or error source chain.
    #[serde(default, deserialize_with = "lenient::text")]
    pub stack_trace: Option<String>,
}

/// An HTTP status code as it appears on the wire: bridges send it as text,
/// native transports as a number.
///
/// Inside a [`RawFrame`], integral floats such as `503.0` read as
/// [`RawStatus::Code`] and other numbers keep their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    /// Numeric status.
    Code(i64),
    /// Textual status, e.g. `"503"`.
    Text(String),
}

impl From<u16> for RawStatus {
    fn from(code: u16) -> Self {
        Self::Code(i64::from(code))
    }
}

impl From<&str> for RawStatus {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// The response that accompanied a failed attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Status code, possibly textual.
    #[serde(default, deserialize_with = "lenient::status")]
    pub status: Option<RawStatus>,
    /// Response body, if it could be read.
    #[serde(default, deserialize_with = "lenient::text")]
    pub body: Option<String>,
    /// Response headers. Scalar values are kept in textual form, others are skipped.
    #[serde(default, deserialize_with = "lenient::headers")]
    pub headers: Option<HashMap<String, String>>,
}

/// A single record reported by a transport.
///
/// Every field other than `kind` is optional: which ones are populated depends
/// on the kind, and a partially-populated frame is still a valid frame.
///
/// Deserialization is field-by-field lenient. A field holding a value of the
/// wrong type reads as absent instead of rejecting the record, and numbers
/// sent as floats or text are accepted where an integer is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    /// What happened.
    #[serde(default, deserialize_with = "lenient::kind")]
    pub kind: FrameKind,
    /// Event type tag of a message.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub event: Option<String>,
    /// Event id of a message.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub id: Option<String>,
    /// Message payload or comment text.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub data: Option<String>,
    /// Failure cause of a retry error.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::record"
    )]
    pub throwable: Option<ThrowablePayload>,
    /// Failed response of a retry error.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::record"
    )]
    pub response: Option<ResponsePayload>,
    /// Server-suggested reconnect delay.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::millis"
    )]
    pub retry_after_millis: Option<u64>,
}

impl RawFrame {
    fn of(kind: FrameKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// The stream was established.
    pub fn open() -> Self {
        Self::of(FrameKind::Open)
    }

    /// The stream stopped.
    pub fn closed() -> Self {
        Self::of(FrameKind::Closed)
    }

    /// The transport is about to re-dial.
    pub fn pre_retry() -> Self {
        Self::of(FrameKind::PreRetry)
    }

    /// A dispatched server event.
    pub fn message(
        id: impl Into<String>,
        event: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            kind: FrameKind::Message,
            id: Some(id.into()),
            event: Some(event.into()),
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// A comment line.
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Comment,
            data: Some(text.into()),
            ..Self::default()
        }
    }

    /// A `retry:` directive.
    pub fn retry_time(millis: u64) -> Self {
        Self {
            kind: FrameKind::RetryTime,
            retry_after_millis: Some(millis),
            ..Self::default()
        }
    }

    /// A failed attempt. Either part may be absent.
    pub fn retry_error(
        throwable: Option<ThrowablePayload>,
        response: Option<ResponsePayload>,
    ) -> Self {
        Self {
            kind: FrameKind::RetryError,
            throwable,
            response,
            ..Self::default()
        }
    }

    /// Parses a frame from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Field deserializers that read off-type values as absent.
mod lenient {
    use std::collections::HashMap;

    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::{Number, Value};

    use super::{FrameKind, RawStatus};

    fn value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?.filter(|value| !value.is_null()))
    }

    fn scalar_text(value: Value) -> Option<String> {
        match value {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    fn integral(value: f64) -> Option<f64> {
        (value.is_finite() && value.fract() == 0.0).then_some(value)
    }

    fn float_as_u64(value: f64) -> Option<u64> {
        integral(value)
            .filter(|value| (0.0..=u64::MAX as f64).contains(value))
            .map(|value| value as u64)
    }

    fn number_as_u64(number: &Number) -> Option<u64> {
        number
            .as_u64()
            .or_else(|| number.as_f64().and_then(float_as_u64))
    }

    pub(super) fn kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FrameKind, D::Error> {
        Ok(value(deserializer)?
            .filter(Value::is_string)
            .and_then(|kind| serde_json::from_value(kind).ok())
            .unwrap_or_default())
    }

    pub(super) fn text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(value(deserializer)?.and_then(scalar_text))
    }

    pub(super) fn millis<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Ok(value(deserializer)?.and_then(|value| match value {
            Value::Number(number) => number_as_u64(&number),
            Value::String(text) => {
                let text = text.trim();
                text.parse::<u64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().and_then(float_as_u64))
            }
            _ => None,
        }))
    }

    pub(super) fn status<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<RawStatus>, D::Error> {
        Ok(value(deserializer)?.and_then(|value| match value {
            Value::Number(number) => Some(
                number
                    .as_i64()
                    .or_else(|| {
                        number
                            .as_f64()
                            .and_then(integral)
                            .filter(|value| (i64::MIN as f64..=i64::MAX as f64).contains(value))
                            .map(|value| value as i64)
                    })
                    .map_or_else(|| RawStatus::Text(number.to_string()), RawStatus::Code),
            ),
            Value::String(text) => Some(RawStatus::Text(text)),
            _ => None,
        }))
    }

    pub(super) fn headers<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<HashMap<String, String>>, D::Error> {
        Ok(value(deserializer)?.and_then(|value| match value {
            Value::Object(entries) => Some(
                entries
                    .into_iter()
                    .filter_map(|(name, value)| scalar_text(value).map(|value| (name, value)))
                    .collect(),
            ),
            _ => None,
        }))
    }

    pub(super) fn record<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(value(deserializer)?.and_then(|value| serde_json::from_value(value).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_retry_error_from_bridge_json() {
        let frame = RawFrame::from_json(
            r#"{"kind":"RETRY_ERROR","throwable":null,"response":{"status":"503","body":"busy","headers":{"retry-after":"5"}}}"#,
        )
        .unwrap();

        assert_eq!(frame.kind, FrameKind::RetryError);
        assert_eq!(frame.throwable, None);
        let response = frame.response.unwrap();
        assert_eq!(response.status, Some(RawStatus::Text("503".to_string())));
        assert_eq!(response.body.as_deref(), Some("busy"));
    }

    #[test]
    fn test_unknown_kind_does_not_fail() {
        let frame = RawFrame::from_json(r#"{"kind":"HEARTBEAT","data":"x"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Unknown);
        assert_eq!(frame.data.as_deref(), Some("x"));
    }

    #[test]
    fn test_numeric_status() {
        let frame = RawFrame::from_json(r#"{"kind":"RETRY_ERROR","response":{"status":500}}"#)
            .unwrap();
        assert_eq!(
            frame.response.unwrap().status,
            Some(RawStatus::Code(500))
        );
    }

    #[test]
    fn test_float_numbers_from_bridges() {
        let frame = RawFrame::from_json(
            r#"{"kind":"RETRY_ERROR","response":{"status":503.0,"body":"x"}}"#,
        )
        .unwrap();
        assert_eq!(frame.response.unwrap().status, Some(RawStatus::Code(503)));

        let frame = RawFrame::from_json(r#"{"kind":"RETRY_TIME","retryAfterMillis":5000.0}"#)
            .unwrap();
        assert_eq!(frame.retry_after_millis, Some(5000));

        let frame = RawFrame::from_json(r#"{"kind":"RETRY_TIME","retryAfterMillis":" 750 "}"#)
            .unwrap();
        assert_eq!(frame.retry_after_millis, Some(750));

        let frame = RawFrame::from_json(
            r#"{"kind":"RETRY_ERROR","response":{"status":503.5}}"#,
        )
        .unwrap();
        assert_eq!(
            frame.response.unwrap().status,
            Some(RawStatus::Text("503.5".to_string()))
        );
    }

    #[test]
    fn test_off_type_fields_read_as_absent() {
        let frame = RawFrame::from_json(
            r#"{
                "kind": "RETRY_ERROR",
                "throwable": {"message": "boom", "stackTrace": ["at x"]},
                "response": {"status": "500", "headers": {"retry-after": 5, "x-list": [1], "x-ok": "y"}}
            }"#,
        )
        .unwrap();

        let throwable = frame.throwable.unwrap();
        assert_eq!(throwable.message.as_deref(), Some("boom"));
        assert_eq!(throwable.stack_trace, None);

        let response = frame.response.unwrap();
        assert_eq!(response.status, Some(RawStatus::Text("500".to_string())));
        let headers = response.headers.unwrap();
        assert_eq!(headers.get("retry-after").map(String::as_str), Some("5"));
        assert_eq!(headers.get("x-ok").map(String::as_str), Some("y"));
        assert!(!headers.contains_key("x-list"));
    }

    #[test]
    fn test_off_type_records_and_kind() {
        let frame = RawFrame::from_json(
            r#"{"kind":"RETRY_ERROR","throwable":"boom","response":[500],"retryAfterMillis":-1,"id":7}"#,
        )
        .unwrap();
        assert_eq!(frame.kind, FrameKind::RetryError);
        assert_eq!(frame.throwable, None);
        assert_eq!(frame.response, None);
        assert_eq!(frame.retry_after_millis, None);
        assert_eq!(frame.id.as_deref(), Some("7"));

        let frame = RawFrame::from_json(r#"{"kind":42}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Unknown);

        assert!(RawFrame::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_camel_case_fields() {
        let json = serde_json::to_value(RawFrame::retry_time(2500)).unwrap();
        assert_eq!(json["kind"], "RETRY_TIME");
        assert_eq!(json["retryAfterMillis"], 2500);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FrameKind::PreRetry.to_string(), "PRE_RETRY");
        assert_eq!(FrameKind::Message.to_string(), "MESSAGE");
    }
}
