//! # sselink HTTP Transport
//!
//! A [`StreamTransport`](sselink_transport_traits::StreamTransport) that reads
//! `text/event-stream` responses over HTTP(S) with reqwest.
//!
//! The transport owns the reconnect loop: every attempt, failure and re-dial is
//! reported to the session engine as a frame, so the engine never needs to know
//! about sockets, status codes or backoff.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sselink_http::{HttpStreamConfig, HttpStreamTransport, RetryPolicy};
//! use sselink_transport_traits::{StreamRequest, StreamTransport};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpStreamConfig::default().with_retry_policy(RetryPolicy::Fixed {
//!     interval: Duration::from_secs(2),
//!     max_attempts: None,
//! });
//! let transport = HttpStreamTransport::new(config)?;
//!
//! let mut stream = transport.establish(StreamRequest::new("https://events.example/feed"))?;
//! while let Some(frame) = stream.recv().await {
//!     println!("{}: {:?}", frame.kind, frame.data);
//! }
//! # Ok(())
//! # }
//! ```

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
mod parser;
mod transport;

pub use config::{HttpStreamConfig, RetryPolicy};
pub use transport::HttpStreamTransport;
