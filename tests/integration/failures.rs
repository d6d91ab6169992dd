use std::sync::Arc;

use homelink_core::PayloadKind;
use homelink_services::{
    IngestOutcome, LoopbackTransport, MalformedFragment, ReassemblyLimits, Transfer,
    TransferError, TransportError,
};

use crate::fault::HeldTransport;
use crate::*;

const CS: u32 = 32;

// ── Producer-side failures ───────────────────────────────────────────────────

#[test]
fn test_send_failure_aborts_remaining_fragments() {
    let transport = HeldTransport::failing_after(3);
    let receiver = Receiver::attached(transport.as_ref(), ReassemblyLimits::default());
    let transfer = Transfer::new(transport.clone(), CS);

    let payload = random_payload(10 * CS as usize);
    assert!(!transfer.start_transfer("cam", "vehicle", PayloadKind::Image, payload));

    // Three sent, the fourth failed, nothing after it was attempted.
    assert_eq!(transport.attempts(), 4);
    assert_eq!(transport.held().len(), 3);

    transport.release();
    assert!(receiver.completed().is_empty());
    let progress = receiver.reassembler.in_progress();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].received_fragments, 3);
    assert_eq!(progress[0].received_bytes, 3 * CS);
    assert_eq!(progress[0].fragment_count, 10);
}

#[test]
fn test_try_start_transfer_reports_failed_sequence() {
    let transport = HeldTransport::failing_after(1);
    let transfer = Transfer::new(transport.clone(), CS);

    let err = transfer
        .try_start_transfer("cam", "vehicle", PayloadKind::Report, random_payload(100))
        .unwrap_err();
    match err {
        TransferError::TransportWrite {
            sequence,
            fragment_count,
            source,
            ..
        } => {
            assert_eq!(sequence, 1);
            assert_eq!(fragment_count, 4);
            assert!(matches!(source, TransportError::Closed));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_closed_transport_delivers_nothing() {
    let transport = Arc::new(LoopbackTransport::new());
    let receiver = Receiver::attached(transport.as_ref(), ReassemblyLimits::default());
    transport.close();

    let transfer = Transfer::new(transport.clone(), CS);
    assert!(!transfer.start_transfer("cam", "vehicle", PayloadKind::Image, random_payload(50)));
    assert_eq!(receiver.in_flight(), 0);
    assert_eq!(receiver.reassembler.stats().streams_opened, 0);
}

// ── Malformed fragments on the wire ──────────────────────────────────────────

#[test]
fn test_out_of_range_fragment_leaves_stream_intact() {
    let transport = HeldTransport::new();
    let receiver = Receiver::attached(transport.as_ref(), ReassemblyLimits::default());
    let transfer = Transfer::new(transport.clone(), CS);

    let payload = random_payload(3 * CS as usize);
    assert!(transfer.start_transfer("cam", "vehicle", PayloadKind::Image, payload.clone()));

    let held = transport.held();
    let mut rogue = held[0].clone();
    rogue.sequence = 3;

    // Deliver two genuine fragments, then the rogue one directly.
    transport.release_with(|f| f[..2].to_vec());
    let before = receiver.reassembler.in_progress()[0].received_bytes;

    let outcome = receiver.reassembler.ingest(rogue);
    assert_eq!(
        outcome,
        IngestOutcome::Dropped(MalformedFragment::SequenceOutOfRange {
            sequence: 3,
            fragment_count: 3,
        })
    );
    assert_eq!(receiver.reassembler.in_progress()[0].received_bytes, before);

    // The last genuine fragment still completes the original payload.
    assert!(matches!(
        receiver.reassembler.ingest(held[2].clone()),
        IngestOutcome::Completed
    ));
    let completed = receiver.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].data.as_ref(), payload.as_slice());
    assert_eq!(receiver.reassembler.stats().fragments_dropped, 1);
}

#[test]
fn test_oversized_stream_is_refused() {
    let transport = Arc::new(LoopbackTransport::new());
    let limits = ReassemblyLimits {
        max_stream_bytes: 1024,
        ..ReassemblyLimits::default()
    };
    let receiver = Receiver::attached(transport.as_ref(), limits);
    let transfer = Transfer::new(transport.clone(), CS);

    // The transport accepts every fragment; the receiver drops them all.
    assert!(transfer.start_transfer("cam", "vehicle", PayloadKind::Image, random_payload(2048)));
    assert!(receiver.completed().is_empty());
    assert_eq!(receiver.in_flight(), 0);
    assert_eq!(receiver.reassembler.stats().fragments_dropped, 64);

    assert!(transfer.start_transfer("cam", "vehicle", PayloadKind::Image, random_payload(1024)));
    assert_eq!(receiver.completed().len(), 1);
}
