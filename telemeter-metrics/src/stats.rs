//! Self-observability counters for the buffered transmitter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters updated by the producer path and the flusher.
#[derive(Debug, Default)]
pub(crate) struct SharedStats {
    pub published: AtomicU64,
    pub flushed: AtomicU64,
    pub evicted: AtomicU64,
    pub failed_flushes: AtomicU64,
}

impl SharedStats {
    pub fn snapshot(&self) -> BufferStats {
        BufferStats {
            published: self.published.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of the buffered transmitter's counters.
///
/// These are metrics about metrics: they make silent eviction and failed
/// flushes observable without ever surfacing them to producers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Measurements accepted from producers.
    pub published: u64,
    /// Measurements successfully delivered downstream.
    pub flushed: u64,
    /// Measurements dropped by FIFO eviction, including evictions while
    /// restoring a failed flush.
    pub evicted: u64,
    /// Flush attempts that failed and were rolled back.
    pub failed_flushes: u64,
}
