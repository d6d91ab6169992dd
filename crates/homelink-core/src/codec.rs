//! Chunk codec — split a payload into fixed-size fragments.
//!
//! Encoding is pure and sends nothing; fragment data slices share the
//! payload's buffer. Sending is the caller's job so that per-fragment
//! failures stay visible.

use bytes::Bytes;

use crate::stream_id::StreamId;
use crate::wire::PayloadKind;

/// Default fragment data size. Leaves ample room under `wire::MAX_MESSAGE`
/// for the header and producer tags.
pub const DEFAULT_CHUNK_SIZE: u32 = 32 * 1024; // 32KB

/// One wire unit: a slice of a stream's payload plus routing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub stream_id: StreamId,
    pub producer_id: String,
    pub producer_kind: String,
    pub payload_kind: PayloadKind,
    pub total_size: u32,
    pub chunk_size: u32,
    pub sequence: u32,
    /// Declared data length. Must equal `data.len()` to be accepted.
    pub length: u32,
    pub data: Bytes,
}

impl Fragment {
    /// True if this is the final fragment of its stream.
    pub fn is_last(&self) -> bool {
        let count = fragment_count(self.total_size, self.chunk_size);
        count > 0 && self.sequence == count - 1
    }
}

/// Tags attached to every fragment of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMeta {
    pub stream_id: StreamId,
    pub producer_id: String,
    pub producer_kind: String,
    pub payload_kind: PayloadKind,
}

/// Number of fragments a payload of `total_size` bytes is split into.
///
/// Always at least one: an empty payload still travels as a single
/// zero-length fragment. Returns 0 only for a zero chunk size, for which
/// no fragment is valid.
pub fn fragment_count(total_size: u32, chunk_size: u32) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size).max(1)
}

/// Data length the fragment at `sequence` must carry, or `None` if
/// `sequence` is out of range for the stream.
pub fn expected_length(total_size: u32, chunk_size: u32, sequence: u32) -> Option<u32> {
    if sequence >= fragment_count(total_size, chunk_size) {
        return None;
    }
    let offset = u64::from(sequence) * u64::from(chunk_size);
    let remaining = u64::from(total_size).saturating_sub(offset);
    // remaining <= total_size, so the narrowing cannot fail
    Some(remaining.min(u64::from(chunk_size)) as u32)
}

/// Split `payload` into fragments of at most `chunk_size` bytes, in
/// increasing sequence order.
pub fn encode(payload: Bytes, chunk_size: u32, meta: &StreamMeta) -> Result<Vec<Fragment>, CodecError> {
    if chunk_size == 0 {
        return Err(CodecError::ZeroChunkSize);
    }
    let total_size =
        u32::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge(payload.len()))?;

    let step = chunk_size as usize;
    let fragments = (0..fragment_count(total_size, chunk_size))
        .map(|sequence| {
            let start = sequence as usize * step;
            let end = start.saturating_add(step).min(payload.len());
            let data = payload.slice(start..end);
            Fragment {
                stream_id: meta.stream_id,
                producer_id: meta.producer_id.clone(),
                producer_kind: meta.producer_kind.clone(),
                payload_kind: meta.payload_kind,
                total_size,
                chunk_size,
                sequence,
                length: data.len() as u32,
                data,
            }
        })
        .collect();

    Ok(fragments)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("chunk size must be non-zero")]
    ZeroChunkSize,

    #[error("payload of {0} bytes exceeds the 4 GiB stream limit")]
    PayloadTooLarge(usize),
}
