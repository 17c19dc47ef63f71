//! # sselink
//!
//! Client sessions for Server-Sent-Events streams.
//!
//! A [`SessionManager`] turns [`ConnectionParameters`] into a [`Session`],
//! reusing the live session when the same URL, headers and query are opened
//! twice. Each session runs the transport's frames through an
//! [`EventDecoder`] and dispatches the resulting [`SessionEvent`]s to the
//! listeners registered on it, in the order the transport produced them.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──open──▶ Open ──failure──▶ Retrying ──open──▶ Open
//!   │             │                    │
//!   └─────────────┴──── close() ───────┴──▶ Closed
//! ```
//!
//! Only [`Session::close`] ends a session. Transport failures are reported to
//! retry-error listeners while the transport keeps reconnecting.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sselink::{
//!     ClosedHandler, ConnectionParameters, HttpStreamConfig, MessageHandler, RetryErrorHandler,
//!     SessionManager,
//! };
//!
//! # tokio_test::block_on(async {
//! let manager = SessionManager::http(HttpStreamConfig::default())?;
//! let params = ConnectionParameters::new("https://events.example/stream")
//!     .header("Authorization", "Bearer token")
//!     .query("topic", "t1");
//!
//! let session = manager.open(&params)?;
//! session.add_event_listener(
//!     "LOCATION_FEED",
//!     MessageHandler::new(|message| println!("location: {}", message.data)),
//! );
//! session.on_retry_error(RetryErrorHandler::new(|error| {
//!     eprintln!("stream failed with status {:?}", error.status());
//! }));
//! session.on_closed(ClosedHandler::signal(|| println!("closed")));
//!
//! // ...
//! session.close();
//! # Ok::<(), sselink::SessionError>(())
//! # }).unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! - `http` (default): the reqwest-backed transport from `sselink-http` and
//!   the matching `http` section of [`ClientConfig`].

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod decoder;
mod error;
mod event;
mod handler;
mod key;
pub mod logging;
mod manager;
mod params;
mod registry;
mod session;

pub use config::{ClientConfig, ConfigError};
pub use decoder::{DecodeAnomaly, EventDecoder};
pub use error::{Result, SessionError};
pub use event::{
    Category, Message, RemoteError, RetryError, RetryNotice, RetryResponse, SessionEvent,
};
pub use handler::{
    ClosedHandler, CommentHandler, Handler, ListenerId, MessageHandler, OpenHandler,
    RetryErrorHandler, RetryNoticeHandler,
};
pub use key::SessionKey;
pub use logging::{LogFormat, LoggingConfig};
pub use manager::SessionManager;
pub use params::ConnectionParameters;
pub use registry::{Subscription, SubscriptionRegistry};
pub use session::{Session, SessionHandle, SessionState, WeakSession};

// Transport seam
pub use sselink_transport_traits::{
    FrameEmitter, FrameKind, RawFrame, RawStatus, ResponsePayload, StreamHandle, StreamRequest,
    StreamTransport, ThrowablePayload, TransportError,
};

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use sselink_http::{HttpStreamConfig, HttpStreamTransport, RetryPolicy};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
