//! Reassembly counters. Lock-free; read them with `snapshot()`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ReassemblyStats {
    streams_opened: AtomicU64,
    streams_completed: AtomicU64,
    streams_evicted: AtomicU64,
    fragments_accepted: AtomicU64,
    fragments_duplicate: AtomicU64,
    fragments_dropped: AtomicU64,
    bytes_completed: AtomicU64,
}

/// Point-in-time copy of `ReassemblyStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub streams_opened: u64,
    pub streams_completed: u64,
    pub streams_evicted: u64,
    pub fragments_accepted: u64,
    pub fragments_duplicate: u64,
    pub fragments_dropped: u64,
    pub bytes_completed: u64,
}

impl ReassemblyStats {
    pub(crate) fn stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stream_completed(&self, bytes: u64) {
        self.streams_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_completed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn streams_evicted(&self, n: u64) {
        self.streams_evicted.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn fragment_accepted(&self) {
        self.fragments_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fragment_duplicate(&self) {
        self.fragments_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fragment_dropped(&self) {
        self.fragments_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            streams_evicted: self.streams_evicted.load(Ordering::Relaxed),
            fragments_accepted: self.fragments_accepted.load(Ordering::Relaxed),
            fragments_duplicate: self.fragments_duplicate.load(Ordering::Relaxed),
            fragments_dropped: self.fragments_dropped.load(Ordering::Relaxed),
            bytes_completed: self.bytes_completed.load(Ordering::Relaxed),
        }
    }
}
