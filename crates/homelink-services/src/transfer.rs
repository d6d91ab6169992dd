//! Producer side — split a payload and push its fragments through the
//! transport.
//!
//! There is no acknowledgement and no retry here. If a send fails the rest
//! of the stream is abandoned; the receiver's partial stream is evicted in
//! due course and the caller may start over under a fresh stream id.

use std::sync::Arc;

use bytes::Bytes;

use homelink_core::{encode, CodecError, PayloadKind, StreamId, StreamIdGenerator, StreamMeta};

use crate::transport::{TransportError, TransportPort};

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to split payload: {0}")]
    Codec(#[from] CodecError),

    #[error("stream {stream_id}: fragment {sequence} of {fragment_count} failed to send: {source}")]
    TransportWrite {
        stream_id: StreamId,
        sequence: u32,
        fragment_count: usize,
        #[source]
        source: TransportError,
    },
}

/// Sends payloads for any number of producers sharing one transport.
pub struct Transfer {
    transport: Arc<dyn TransportPort>,
    ids: StreamIdGenerator,
    chunk_size: u32,
}

impl Transfer {
    pub fn new(transport: Arc<dyn TransportPort>, chunk_size: u32) -> Self {
        Self::with_ids(transport, chunk_size, StreamIdGenerator::new())
    }

    pub fn with_ids(transport: Arc<dyn TransportPort>, chunk_size: u32, ids: StreamIdGenerator) -> Self {
        Self {
            transport,
            ids,
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Send `payload` as a new stream. Returns false if any fragment failed
    /// to send; the failure is logged.
    pub fn start_transfer(
        &self,
        producer_id: &str,
        producer_kind: &str,
        payload_kind: PayloadKind,
        payload: impl Into<Bytes>,
    ) -> bool {
        match self.try_start_transfer(producer_id, producer_kind, payload_kind, payload) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(producer_id, error = %e, "transfer failed");
                false
            }
        }
    }

    /// Like `start_transfer`, but returns the stream id or the error.
    pub fn try_start_transfer(
        &self,
        producer_id: &str,
        producer_kind: &str,
        payload_kind: PayloadKind,
        payload: impl Into<Bytes>,
    ) -> Result<StreamId, TransferError> {
        let meta = StreamMeta {
            stream_id: self.ids.next_id(),
            producer_id: producer_id.to_string(),
            producer_kind: producer_kind.to_string(),
            payload_kind,
        };
        let payload = payload.into();
        let bytes = payload.len();
        let fragments = encode(payload, self.chunk_size, &meta)?;
        let fragment_count = fragments.len();

        for fragment in &fragments {
            self.transport
                .send(fragment)
                .map_err(|source| TransferError::TransportWrite {
                    stream_id: meta.stream_id,
                    sequence: fragment.sequence,
                    fragment_count,
                    source,
                })?;
        }

        tracing::info!(
            stream_id = %meta.stream_id,
            producer_id,
            payload_kind = %payload_kind,
            bytes,
            fragments = fragment_count,
            "transfer sent"
        );
        Ok(meta.stream_id)
    }
}
