//! Stream table — every reassembly in flight, keyed by stream id.
//!
//! The table is shared (cheap `Clone`) but only `StreamReassembler` mutates
//! it. All writes to one stream go through that stream's shard lock, so two
//! fragments of the same stream never merge concurrently.
//!
//! Completed stream ids are remembered for one stream lifetime so that a
//! late duplicate of an already-delivered fragment cannot reopen the stream.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use dashmap::DashMap;
use tokio::time::Instant;

use homelink_core::{fragment_count, Fragment, PayloadKind, StreamId};

use crate::sink::CompletedPayload;

/// Buffer and bookkeeping for one partially received payload.
#[derive(Debug)]
pub(crate) struct ReassemblyStream {
    stream_id: StreamId,
    producer_id: String,
    producer_kind: String,
    payload_kind: PayloadKind,
    total_size: u32,
    chunk_size: u32,
    fragment_count: u32,
    buffer: BytesMut,
    received_mask: Vec<u64>,
    received_fragments: u32,
    received_bytes: u32,
    created_at: Instant,
    last_fragment_at: Instant,
}

impl ReassemblyStream {
    /// Size and tag a new stream from the first fragment seen for its id.
    /// `first.chunk_size` must already be known non-zero.
    pub(crate) fn new(first: &Fragment, now: Instant) -> Self {
        let fragment_count = fragment_count(first.total_size, first.chunk_size);
        let words = (fragment_count as usize).div_ceil(64);
        Self {
            stream_id: first.stream_id,
            producer_id: first.producer_id.clone(),
            producer_kind: first.producer_kind.clone(),
            payload_kind: first.payload_kind,
            total_size: first.total_size,
            chunk_size: first.chunk_size,
            fragment_count,
            buffer: BytesMut::zeroed(first.total_size as usize),
            received_mask: vec![0; words],
            received_fragments: 0,
            received_bytes: 0,
            created_at: now,
            last_fragment_at: now,
        }
    }

    /// Whether `fragment` describes the same stream as the one captured at
    /// creation.
    pub(crate) fn matches(&self, fragment: &Fragment) -> bool {
        self.total_size == fragment.total_size
            && self.chunk_size == fragment.chunk_size
            && self.payload_kind == fragment.payload_kind
            && self.producer_id == fragment.producer_id
            && self.producer_kind == fragment.producer_kind
    }

    pub(crate) fn has(&self, sequence: u32) -> bool {
        let (word, bit) = bit_position(sequence);
        self.received_mask
            .get(word)
            .is_some_and(|w| (w >> bit) & 1 == 1)
    }

    /// Copy a validated, not-yet-seen fragment into place.
    pub(crate) fn merge(&mut self, fragment: &Fragment, now: Instant) {
        let offset = fragment.sequence as usize * self.chunk_size as usize;
        let end = offset + fragment.data.len();
        self.buffer[offset..end].copy_from_slice(&fragment.data);

        let (word, bit) = bit_position(fragment.sequence);
        if let Some(w) = self.received_mask.get_mut(word) {
            *w |= 1u64 << bit;
        }
        self.received_fragments += 1;
        self.received_bytes += fragment.length;
        self.last_fragment_at = now;
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.received_bytes == self.total_size && self.received_fragments == self.fragment_count
    }

    pub(crate) fn received_bytes(&self) -> u32 {
        self.received_bytes
    }

    pub(crate) fn total_size(&self) -> u32 {
        self.total_size
    }

    pub(crate) fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub(crate) fn into_payload(self) -> CompletedPayload {
        CompletedPayload {
            stream_id: self.stream_id,
            producer_id: self.producer_id,
            producer_kind: self.producer_kind,
            payload_kind: self.payload_kind,
            data: self.buffer.freeze(),
        }
    }

    fn progress(&self, now: Instant) -> StreamProgress {
        StreamProgress {
            stream_id: self.stream_id,
            producer_id: self.producer_id.clone(),
            producer_kind: self.producer_kind.clone(),
            payload_kind: self.payload_kind,
            received_bytes: self.received_bytes,
            total_size: self.total_size,
            received_fragments: self.received_fragments,
            fragment_count: self.fragment_count,
            age: now.saturating_duration_since(self.created_at),
            idle: now.saturating_duration_since(self.last_fragment_at),
        }
    }
}

fn bit_position(sequence: u32) -> (usize, u32) {
    ((sequence / 64) as usize, sequence % 64)
}

/// Snapshot of one in-flight stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProgress {
    pub stream_id: StreamId,
    pub producer_id: String,
    pub producer_kind: String,
    pub payload_kind: PayloadKind,
    pub received_bytes: u32,
    pub total_size: u32,
    pub received_fragments: u32,
    pub fragment_count: u32,
    /// Time since the first fragment arrived.
    pub age: Duration,
    /// Time since the most recent fragment arrived.
    pub idle: Duration,
}

/// A stream discarded by the eviction sweep.
pub type EvictedStream = StreamProgress;

/// Registry of in-flight streams.
#[derive(Debug, Clone, Default)]
pub struct StreamTable {
    streams: Arc<DashMap<StreamId, ReassemblyStream>>,
    // stream_id -> completed_at
    completed: Arc<DashMap<StreamId, Instant>>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams still being reassembled.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn contains(&self, stream_id: &StreamId) -> bool {
        self.streams.contains_key(stream_id)
    }

    /// Snapshot of every stream in flight.
    pub fn in_progress(&self) -> Vec<StreamProgress> {
        let now = Instant::now();
        self.streams
            .iter()
            .map(|entry| entry.value().progress(now))
            .collect()
    }

    pub fn progress(&self, stream_id: &StreamId) -> Option<StreamProgress> {
        let now = Instant::now();
        self.streams.get(stream_id).map(|s| s.progress(now))
    }

    pub(crate) fn streams(&self) -> &DashMap<StreamId, ReassemblyStream> {
        &self.streams
    }

    pub(crate) fn was_completed(&self, stream_id: &StreamId) -> bool {
        self.completed.contains_key(stream_id)
    }

    pub(crate) fn mark_completed(&self, stream_id: StreamId, now: Instant) {
        self.completed.insert(stream_id, now);
    }

    /// Remove streams created more than `max_lifetime` before `now`, and
    /// forget completions older than that.
    pub(crate) fn evict_older_than(&self, max_lifetime: Duration, now: Instant) -> Vec<EvictedStream> {
        let mut evicted = Vec::new();
        self.streams.retain(|_, stream| {
            let expired = now.saturating_duration_since(stream.created_at) > max_lifetime;
            if expired {
                evicted.push(stream.progress(now));
            }
            !expired
        });
        self.completed
            .retain(|_, completed_at| now.saturating_duration_since(*completed_at) <= max_lifetime);
        evicted
    }
}
