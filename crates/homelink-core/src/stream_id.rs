//! Stream identifiers.
//!
//! An id is 16 bytes: an 8-byte producer namespace drawn at random when the
//! generator is created, then an 8-byte counter. Two transfers from the same
//! generator never collide, and two generators collide only if their random
//! namespaces do.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one in-flight transfer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId([u8; 16]);

impl StreamId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_parts(namespace: u64, counter: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&namespace.to_be_bytes());
        bytes[8..].copy_from_slice(&counter.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4]) + &hex::encode(&self.0[12..])
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamId({})", hex::encode(self.0))
    }
}

/// Hands out stream ids for one producer. Safe to share between threads.
#[derive(Debug)]
pub struct StreamIdGenerator {
    namespace: u64,
    next: AtomicU64,
}

impl StreamIdGenerator {
    /// Generator with a random namespace.
    pub fn new() -> Self {
        Self::with_namespace(rand::random())
    }

    pub fn with_namespace(namespace: u64) -> Self {
        Self {
            namespace,
            next: AtomicU64::new(0),
        }
    }

    pub fn namespace(&self) -> u64 {
        self.namespace
    }

    pub fn next_id(&self) -> StreamId {
        let counter = self.next.fetch_add(1, Ordering::Relaxed);
        StreamId::from_parts(self.namespace, counter)
    }
}

impl Default for StreamIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
