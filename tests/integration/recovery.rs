//! Eviction and retry. Runs on tokio's paused clock so lifetimes can be
//! crossed without sleeping.

use std::time::Duration;

use homelink_core::PayloadKind;
use homelink_services::{ReassemblyLimits, Transfer};

use crate::fault::HeldTransport;
use crate::*;

const CS: u32 = 16;

fn limits() -> ReassemblyLimits {
    ReassemblyLimits {
        max_lifetime: Duration::from_secs(30),
        ..ReassemblyLimits::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_lost_fragment_stream_is_evicted() {
    let transport = HeldTransport::new();
    let receiver = Receiver::attached(transport.as_ref(), limits());
    let transfer = Transfer::new(transport.clone(), CS);

    assert!(transfer.start_transfer("dashcam", "vehicle", PayloadKind::Image, random_payload(100)));
    transport.release_dropping(2);
    assert_eq!(receiver.in_flight(), 1);

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(receiver.reassembler.evict_expired().is_empty());
    assert_eq!(receiver.in_flight(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let evicted = receiver.reassembler.evict_expired();
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].producer_id, "dashcam");
    assert_eq!(evicted[0].received_bytes, 100 - CS);
    assert_eq!(evicted[0].total_size, 100);

    assert_eq!(receiver.in_flight(), 0);
    assert!(receiver.completed().is_empty());
    assert_eq!(receiver.reassembler.stats().streams_evicted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_eviction_completes() {
    let transport = HeldTransport::new();
    let receiver = Receiver::attached(transport.as_ref(), limits());
    let transfer = Transfer::new(transport.clone(), CS);

    let payload = random_payload(5 * CS as usize);
    let first = transfer
        .try_start_transfer("dashcam", "vehicle", PayloadKind::Image, payload.clone())
        .unwrap();
    transport.release_dropping(0);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(receiver.reassembler.evict_expired().len(), 1);

    // The producer tries again; a fresh stream id, a clean reassembly.
    let second = transfer
        .try_start_transfer("dashcam", "vehicle", PayloadKind::Image, payload.clone())
        .unwrap();
    assert_ne!(first, second);
    transport.release_shuffled();

    let completed = receiver.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].stream_id, second);
    assert_eq!(completed[0].data.as_ref(), payload.as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_eviction_spares_fresh_streams() {
    let transport = HeldTransport::new();
    let receiver = Receiver::attached(transport.as_ref(), limits());
    let transfer = Transfer::new(transport.clone(), CS);

    assert!(transfer.start_transfer("old", "vehicle", PayloadKind::Image, random_payload(64)));
    transport.release_dropping(3);

    tokio::time::advance(Duration::from_secs(20)).await;
    assert!(transfer.start_transfer("new", "vehicle", PayloadKind::Report, random_payload(64)));
    transport.release_dropping(3);
    assert_eq!(receiver.in_flight(), 2);

    tokio::time::advance(Duration::from_secs(15)).await;
    let evicted = receiver.reassembler.evict_expired();
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].producer_id, "old");

    let remaining = receiver.reassembler.in_progress();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].producer_id, "new");
}
