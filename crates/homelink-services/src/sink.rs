//! Sinks — where completed payloads go.
//!
//! The reassembler calls `Sink::on_complete` exactly once per completed
//! stream. What happens next (write a file, feed a chart store, raise an
//! alert) belongs to the application.

use bytes::Bytes;
use tokio::sync::mpsc;

use homelink_core::{PayloadKind, StreamId};

/// A fully reassembled stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPayload {
    pub stream_id: StreamId,
    pub producer_id: String,
    pub producer_kind: String,
    pub payload_kind: PayloadKind,
    /// Contiguous, in-order payload bytes.
    pub data: Bytes,
}

pub trait Sink: Send + Sync {
    fn on_complete(&self, payload: CompletedPayload);
}

impl<F> Sink for F
where
    F: Fn(CompletedPayload) + Send + Sync,
{
    fn on_complete(&self, payload: CompletedPayload) {
        self(payload)
    }
}

/// Forwards completed payloads onto an unbounded channel, for consumers
/// that want to do async work (disk, network) outside the ingest path.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CompletedPayload>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompletedPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn on_complete(&self, payload: CompletedPayload) {
        let stream_id = payload.stream_id;
        if self.tx.send(payload).is_err() {
            tracing::warn!(
                stream_id = %stream_id,
                "payload receiver dropped, discarding completed payload"
            );
        }
    }
}
