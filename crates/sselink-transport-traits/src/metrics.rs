//! Stream metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a stream's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// Total number of event bytes received.
    pub bytes_received: u64,

    /// Total number of frames emitted to the consumer.
    pub frames_received: u64,

    /// Total number of connection attempts.
    pub connections: u64,

    /// Total number of failed connection attempts.
    pub failed_connections: u64,

    /// Total number of re-dials after the first attempt.
    pub reconnects: u64,

    /// Total number of events dropped for exceeding the size limit.
    pub oversized_frames: u64,
}

/// Lock-free counters updated from the connection task.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total event bytes received (atomic counter).
    pub bytes_received: AtomicU64,

    /// Total frames emitted (atomic counter).
    pub frames_received: AtomicU64,

    /// Total connection attempts (atomic counter).
    pub connections: AtomicU64,

    /// Failed connection attempts (atomic counter).
    pub failed_connections: AtomicU64,

    /// Re-dials (atomic counter).
    pub reconnects: AtomicU64,

    /// Oversized events dropped (atomic counter).
    pub oversized_frames: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one received event of `size` bytes.
    pub fn record_frame(&self, size: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Creates a serializable `StreamMetrics` snapshot from the current atomic values.
    pub fn snapshot(&self) -> StreamMetrics {
        StreamMetrics {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            oversized_frames: self.oversized_frames.load(Ordering::Relaxed),
        }
    }

    /// Resets all atomic metric counters to zero.
    pub fn reset(&self) {
        self.bytes_received.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.connections.store(0, Ordering::Relaxed);
        self.failed_connections.store(0, Ordering::Relaxed);
        self.reconnects.store(0, Ordering::Relaxed);
        self.oversized_frames.store(0, Ordering::Relaxed);
    }
}
