//! homelink integration test harness.
//!
//! Everything runs in-process: producers push through a `Transfer`, the
//! fragments cross a transport (loopback, or the fault-injecting
//! `HeldTransport`), and a `StreamReassembler` hands completed payloads to
//! a recording sink.
//!
//!   cargo test --test integration

mod failures;
mod fault;
mod recovery;

use std::sync::{Arc, Mutex};

use rand::RngCore;

use homelink_services::{CompletedPayload, ReassemblyLimits, StreamReassembler, TransportPort};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Receiving end of a test: a reassembler plus every payload it completed.
pub struct Receiver {
    pub reassembler: Arc<StreamReassembler>,
    completed: Arc<Mutex<Vec<CompletedPayload>>>,
}

impl Receiver {
    pub fn new(limits: ReassemblyLimits) -> Self {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink_log = completed.clone();
        let sink = Arc::new(move |payload: CompletedPayload| {
            sink_log.lock().unwrap().push(payload);
        });
        Self {
            reassembler: Arc::new(StreamReassembler::new(sink, limits)),
            completed,
        }
    }

    /// A receiver already listening on `transport`.
    pub fn attached(transport: &dyn TransportPort, limits: ReassemblyLimits) -> Self {
        let receiver = Self::new(limits);
        receiver.reassembler.attach(transport);
        receiver
    }

    pub fn completed(&self) -> Vec<CompletedPayload> {
        self.completed.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.reassembler.table().len()
    }
}

pub fn random_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Payload sizes at the edges of fragmentation for chunk size `cs`.
pub fn edge_sizes(cs: usize) -> [usize; 6] {
    [0, 1, cs - 1, cs, cs + 1, 10 * cs]
}

// ── Smoke ─────────────────────────────────────────────────────────────────────

#[test]
fn test_harness_starts_empty() {
    let receiver = Receiver::new(ReassemblyLimits::default());
    assert!(receiver.completed().is_empty());
    assert_eq!(receiver.in_flight(), 0);
    assert_eq!(receiver.reassembler.stats().streams_opened, 0);
}
