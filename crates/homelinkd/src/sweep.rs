//! Sweep loop — periodically evicts streams that outlived their transfer
//! window without completing.

use std::sync::Arc;
use std::time::Duration;

use homelink_services::StreamReassembler;
use tokio::sync::broadcast;

pub async fn sweep_loop(
    reassembler: Arc<StreamReassembler>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("sweep loop shutting down");
                return;
            }
            _ = interval.tick() => {
                let evicted = reassembler.evict_expired();
                if !evicted.is_empty() {
                    let stats = reassembler.stats();
                    tracing::info!(
                        evicted = evicted.len(),
                        in_flight = reassembler.table().len(),
                        completed_total = stats.streams_completed,
                        evicted_total = stats.streams_evicted,
                        "sweep finished"
                    );
                }
            }
        }
    }
}
