//! Counters describing what a link has received.

use std::sync::atomic::{AtomicU64, Ordering};

/// A snapshot of a link's receive counters.
///
/// Counters accumulate over the lifetime of the [`Link`](super::Link),
/// across reconnections.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Stats {
    frames_received: u64,
    frames_dropped: u64,
    buffer_overflows: u64,
    bytes_received: u64,
}

impl Stats {
    /// The number of frames successfully parsed.
    pub const fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// The number of malformed frames that were dropped.
    pub const fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// The number of times the receive buffer was truncated.
    pub const fn buffer_overflows(&self) -> u64 {
        self.buffer_overflows
    }

    /// The number of raw bytes read from the device.
    pub const fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

/// The live counters, updated by the reader loop.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    buffer_overflows: AtomicU64,
    bytes_received: AtomicU64,
}

impl Counters {
    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn buffer_overflowed(&self) {
        self.buffer_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_received(&self, count: usize) {
        self.bytes_received
            .fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}
