//! Stream reassembler — merges arriving fragments into per-stream buffers
//! and hands each completed payload to the sink exactly once.
//!
//! Nothing on the ingest path is fatal. A bad fragment is logged and dropped;
//! the stream it claims to belong to, and every other stream, carry on.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use homelink_core::config::ReassemblyConfig;
use homelink_core::{expected_length, fragment_count, Fragment};

use crate::sink::{CompletedPayload, Sink};
use crate::stats::{ReassemblyStats, StatsSnapshot};
use crate::stream_table::{EvictedStream, ReassemblyStream, StreamProgress, StreamTable};
use crate::transport::TransportPort;

/// Bounds on what a reassembler will hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyLimits {
    /// Incomplete streams older than this are evicted by the sweep.
    pub max_lifetime: Duration,
    /// Largest total_size a new stream may declare. 0 = unlimited.
    pub max_stream_bytes: u64,
    /// Max streams open at once. 0 = unlimited.
    pub max_streams: usize,
}

impl Default for ReassemblyLimits {
    fn default() -> Self {
        Self::from(&ReassemblyConfig::default())
    }
}

impl From<&ReassemblyConfig> for ReassemblyLimits {
    fn from(config: &ReassemblyConfig) -> Self {
        Self {
            max_lifetime: config.max_lifetime(),
            max_stream_bytes: config.max_stream_bytes,
            max_streams: config.max_streams,
        }
    }
}

/// Why a fragment was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedFragment {
    #[error("declared length {declared} but carries {actual} bytes")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("chunk size is zero")]
    ZeroChunkSize,

    #[error("sequence {sequence} outside stream of {fragment_count} fragments")]
    SequenceOutOfRange { sequence: u32, fragment_count: u32 },

    #[error("fragment {sequence} should carry {expected} bytes, carries {actual}")]
    UnexpectedLength {
        sequence: u32,
        expected: u32,
        actual: u32,
    },

    #[error("header disagrees with stream (stream total {stream_total}/chunk {stream_chunk}, fragment total {total_size}/chunk {chunk_size})")]
    HeaderMismatch {
        stream_total: u32,
        stream_chunk: u32,
        total_size: u32,
        chunk_size: u32,
    },

    #[error("stream declares {total_size} bytes, limit is {max}")]
    StreamTooLarge { total_size: u32, max: u64 },

    #[error("stream table full ({max} streams)")]
    TooManyStreams { max: usize },
}

/// What `ingest` did with a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Merged; the stream still waits for more.
    Accepted { received_bytes: u32, total_size: u32 },
    /// Already had it. Not an error.
    Duplicate,
    /// This fragment finished its stream; the sink has been called.
    Completed,
    Dropped(MalformedFragment),
}

enum Merge {
    Accepted { received_bytes: u32, total_size: u32 },
    Duplicate,
    Completed(ReassemblyStream),
}

pub struct StreamReassembler {
    table: StreamTable,
    sink: Arc<dyn Sink>,
    limits: ReassemblyLimits,
    stats: ReassemblyStats,
}

impl StreamReassembler {
    pub fn new(sink: Arc<dyn Sink>, limits: ReassemblyLimits) -> Self {
        Self {
            table: StreamTable::new(),
            sink,
            limits,
            stats: ReassemblyStats::default(),
        }
    }

    /// Feed every fragment `transport` receives into this reassembler.
    pub fn attach(self: &Arc<Self>, transport: &dyn TransportPort) {
        let this = Arc::clone(self);
        transport.on_receive(Arc::new(move |fragment: Fragment| {
            this.ingest(fragment);
        }));
    }

    pub fn limits(&self) -> ReassemblyLimits {
        self.limits
    }

    /// Read-only view of the streams in flight.
    pub fn table(&self) -> &StreamTable {
        &self.table
    }

    pub fn in_progress(&self) -> Vec<StreamProgress> {
        self.table.in_progress()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Merge one fragment. Safe to call from any number of threads.
    pub fn ingest(&self, fragment: Fragment) -> IngestOutcome {
        let stream_id = fragment.stream_id;
        let sequence = fragment.sequence;

        match self.merge(&fragment) {
            Ok(Merge::Accepted {
                received_bytes,
                total_size,
            }) => {
                self.stats.fragment_accepted();
                tracing::trace!(
                    stream_id = %stream_id,
                    sequence,
                    received_bytes,
                    total_size,
                    "fragment merged"
                );
                IngestOutcome::Accepted {
                    received_bytes,
                    total_size,
                }
            }
            Ok(Merge::Duplicate) => {
                self.stats.fragment_duplicate();
                tracing::debug!(stream_id = %stream_id, sequence, "duplicate fragment, ignoring");
                IngestOutcome::Duplicate
            }
            Ok(Merge::Completed(stream)) => {
                self.stats.fragment_accepted();
                self.complete(stream.into_payload());
                IngestOutcome::Completed
            }
            Err(reason) => {
                self.stats.fragment_dropped();
                tracing::warn!(
                    stream_id = %stream_id,
                    producer_id = %fragment.producer_id,
                    sequence,
                    error = %reason,
                    "malformed fragment, dropping"
                );
                IngestOutcome::Dropped(reason)
            }
        }
    }

    /// Drop incomplete streams older than the configured lifetime.
    pub fn evict_expired(&self) -> Vec<EvictedStream> {
        self.evict_expired_at(Instant::now())
    }

    /// `evict_expired` against an explicit clock reading.
    pub fn evict_expired_at(&self, now: Instant) -> Vec<EvictedStream> {
        let evicted = self.table.evict_older_than(self.limits.max_lifetime, now);
        for stream in &evicted {
            tracing::warn!(
                stream_id = %stream.stream_id,
                producer_id = %stream.producer_id,
                payload_kind = %stream.payload_kind,
                received_bytes = stream.received_bytes,
                total_size = stream.total_size,
                received_fragments = stream.received_fragments,
                fragment_count = stream.fragment_count,
                age_ms = stream.age.as_millis() as u64,
                idle_ms = stream.idle.as_millis() as u64,
                "evicting incomplete stream (timed out)"
            );
        }
        self.stats.streams_evicted(evicted.len() as u64);
        evicted
    }

    fn merge(&self, fragment: &Fragment) -> Result<Merge, MalformedFragment> {
        validate(fragment)?;

        let stream_id = fragment.stream_id;
        let now = Instant::now();

        // Table capacity is checked outside the entry guard: counting the
        // table needs every shard, including the one the guard holds.
        if !self.table.contains(&stream_id) && !self.table.was_completed(&stream_id) {
            let max = self.limits.max_streams;
            if max > 0 && self.table.len() >= max {
                return Err(MalformedFragment::TooManyStreams { max });
            }
        }

        match self.table.streams().entry(stream_id) {
            Entry::Occupied(mut slot) => {
                let stream = slot.get_mut();
                if !stream.matches(fragment) {
                    return Err(MalformedFragment::HeaderMismatch {
                        stream_total: stream.total_size(),
                        stream_chunk: stream.chunk_size(),
                        total_size: fragment.total_size,
                        chunk_size: fragment.chunk_size,
                    });
                }
                if stream.has(fragment.sequence) {
                    return Ok(Merge::Duplicate);
                }
                stream.merge(fragment, now);
                if stream.is_complete() {
                    self.table.mark_completed(stream_id, now);
                    return Ok(Merge::Completed(slot.remove()));
                }
                Ok(Merge::Accepted {
                    received_bytes: stream.received_bytes(),
                    total_size: stream.total_size(),
                })
            }
            Entry::Vacant(slot) => {
                if self.table.was_completed(&stream_id) {
                    return Ok(Merge::Duplicate);
                }
                let max = self.limits.max_stream_bytes;
                if max > 0 && u64::from(fragment.total_size) > max {
                    return Err(MalformedFragment::StreamTooLarge {
                        total_size: fragment.total_size,
                        max,
                    });
                }

                let mut stream = ReassemblyStream::new(fragment, now);
                stream.merge(fragment, now);
                self.stats.stream_opened();
                tracing::debug!(
                    stream_id = %stream_id,
                    producer_id = %fragment.producer_id,
                    payload_kind = %fragment.payload_kind,
                    total_size = fragment.total_size,
                    first_sequence = fragment.sequence,
                    "stream opened"
                );

                if stream.is_complete() {
                    self.table.mark_completed(stream_id, now);
                    return Ok(Merge::Completed(stream));
                }
                let received_bytes = stream.received_bytes();
                let total_size = stream.total_size();
                slot.insert(stream);
                Ok(Merge::Accepted {
                    received_bytes,
                    total_size,
                })
            }
        }
    }

    // Runs after the table entry is released, so a sink may safely call back
    // into this reassembler.
    fn complete(&self, payload: CompletedPayload) {
        let bytes = payload.data.len() as u64;
        self.stats.stream_completed(bytes);
        tracing::info!(
            stream_id = %payload.stream_id,
            producer_id = %payload.producer_id,
            producer_kind = %payload.producer_kind,
            payload_kind = %payload.payload_kind,
            bytes,
            "stream reassembled"
        );
        self.sink.on_complete(payload);
    }
}

/// Checks a fragment can make sense on its own, before any table lookup.
fn validate(fragment: &Fragment) -> Result<(), MalformedFragment> {
    if fragment.length as usize != fragment.data.len() {
        return Err(MalformedFragment::LengthMismatch {
            declared: fragment.length,
            actual: fragment.data.len(),
        });
    }
    if fragment.chunk_size == 0 {
        return Err(MalformedFragment::ZeroChunkSize);
    }
    let expected = expected_length(fragment.total_size, fragment.chunk_size, fragment.sequence)
        .ok_or(MalformedFragment::SequenceOutOfRange {
            sequence: fragment.sequence,
            fragment_count: fragment_count(fragment.total_size, fragment.chunk_size),
        })?;
    if fragment.length != expected {
        return Err(MalformedFragment::UnexpectedLength {
            sequence: fragment.sequence,
            expected,
            actual: fragment.length,
        });
    }
    Ok(())
}
