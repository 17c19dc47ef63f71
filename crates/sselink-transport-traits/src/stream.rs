//! The channel pair connecting a transport's connection task to its consumer.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::frame::{RawFrame, ResponsePayload, ThrowablePayload};

/// Consumer half of an established stream.
///
/// Dropping the handle terminates the stream.
#[derive(Debug)]
pub struct StreamHandle {
    frames: mpsc::Receiver<RawFrame>,
    shutdown: CancellationToken,
}

impl StreamHandle {
    /// Creates a connected emitter/handle pair with room for `capacity` frames.
    #[must_use]
    pub fn channel(capacity: usize) -> (FrameEmitter, Self) {
        let (sender, frames) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        (
            FrameEmitter {
                sender,
                shutdown: shutdown.clone(),
            },
            Self { frames, shutdown },
        )
    }

    /// Waits for the next frame. Returns `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<RawFrame> {
        self.frames.recv().await
    }

    /// A token that cancels the stream when triggered.
    ///
    /// Lets another context terminate the stream while the handle itself is
    /// parked in a receive loop.
    pub fn terminator(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Instructs the transport to stop.
    pub fn terminate(&self) {
        self.shutdown.cancel();
    }

    /// Returns `true` once [`terminate`](Self::terminate) was called.
    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Transport half of an established stream.
///
/// All `emit_*` methods wait for channel capacity so frames are never dropped
/// and arrive in emission order; they return `false` once the consumer is gone.
#[derive(Debug, Clone)]
pub struct FrameEmitter {
    sender: mpsc::Sender<RawFrame>,
    shutdown: CancellationToken,
}

impl FrameEmitter {
    /// Emits a frame.
    pub async fn emit(&self, frame: RawFrame) -> bool {
        self.sender.send(frame).await.is_ok()
    }

    /// Emits an `OPEN` frame.
    pub async fn emit_open(&self) -> bool {
        self.emit(RawFrame::open()).await
    }

    /// Emits a `MESSAGE` frame.
    pub async fn emit_message(
        &self,
        id: impl Into<String>,
        event: impl Into<String>,
        data: impl Into<String>,
    ) -> bool {
        self.emit(RawFrame::message(id, event, data)).await
    }

    /// Emits a `COMMENT` frame.
    pub async fn emit_comment(&self, text: impl Into<String>) -> bool {
        self.emit(RawFrame::comment(text)).await
    }

    /// Emits a `RETRY_TIME` frame.
    pub async fn emit_retry_time(&self, millis: u64) -> bool {
        self.emit(RawFrame::retry_time(millis)).await
    }

    /// Emits a `RETRY_ERROR` frame.
    pub async fn emit_retry_error(
        &self,
        throwable: Option<ThrowablePayload>,
        response: Option<ResponsePayload>,
    ) -> bool {
        self.emit(RawFrame::retry_error(throwable, response)).await
    }

    /// Emits a `PRE_RETRY` frame.
    pub async fn emit_pre_retry(&self) -> bool {
        self.emit(RawFrame::pre_retry()).await
    }

    /// Emits a `CLOSED` frame.
    pub async fn emit_closed(&self) -> bool {
        self.emit(RawFrame::closed()).await
    }

    /// Completes when the consumer asked the stream to stop.
    pub async fn terminated(&self) {
        self.shutdown.cancelled().await;
    }

    /// Returns `true` if the consumer asked the stream to stop.
    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
