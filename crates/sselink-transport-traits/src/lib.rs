//! # sselink Transport Traits
//!
//! The seam between a streaming transport and the sselink session engine.
//! Transports open a long-lived event stream and report everything that happens
//! on it as [`RawFrame`] records; the session engine decodes and dispatches them.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Frames**: [`RawFrame`], [`FrameKind`], [`ThrowablePayload`], [`ResponsePayload`]
//! - **Traits**: [`StreamTransport`]
//! - **Channels**: [`StreamHandle`], [`FrameEmitter`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`LimitsConfig`], [`TimeoutConfig`], [`TlsConfig`]
//! - **Metrics**: [`StreamMetrics`], [`AtomicMetrics`]
//!
//! ## Usage
//!
//! Transport implementations create a channel pair, hand the [`StreamHandle`] back
//! to the caller and keep the [`FrameEmitter`] inside their connection task:
//!
//! ```rust,ignore
//! use sselink_transport_traits::{StreamHandle, StreamRequest, StreamTransport, TransportResult};
//!
//! #[derive(Debug)]
//! struct MyTransport;
//!
//! impl StreamTransport for MyTransport {
//!     fn establish(&self, request: StreamRequest) -> TransportResult<StreamHandle> {
//!         let (emitter, handle) = StreamHandle::channel(256);
//!         tokio::spawn(async move {
//!             emitter.emit_open().await;
//!             // ... read the stream, emit frames ...
//!         });
//!         Ok(handle)
//!     }
//! }
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
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

mod config;
mod error;
mod frame;
mod metrics;
mod stream;
mod traits;

pub use config::{LimitsConfig, TimeoutConfig, TlsConfig, TlsVersion, duration_ms};
pub use error::{TransportError, TransportResult, validate_frame_size};
pub use frame::{FrameKind, RawFrame, RawStatus, ResponsePayload, ThrowablePayload};
pub use metrics::{AtomicMetrics, StreamMetrics};
pub use stream::{FrameEmitter, StreamHandle};
pub use traits::{StreamRequest, StreamTransport};
