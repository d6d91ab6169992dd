//! Send worker — dequeues framed fragments and writes them to the peer.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

pub struct SendWorker {
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
    rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: broadcast::Receiver<()>,
}

impl SendWorker {
    pub fn new(
        socket: Arc<UdpSocket>,
        peer_addr: SocketAddr,
        rx: mpsc::UnboundedReceiver<Bytes>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            peer_addr,
            rx,
            shutdown,
        }
    }

    /// Runs until shutdown, or until every transport handle is dropped and
    /// the queue is drained.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut sent: u64 = 0;
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(sent, "send worker shutting down");
                    return Ok(());
                }

                msg = self.rx.recv() => {
                    let message = match msg {
                        Some(m) => m,
                        None => {
                            tracing::debug!(sent, "transport dropped, send worker exiting");
                            return Ok(());
                        }
                    };
                    match self.socket.send_to(&message, self.peer_addr).await {
                        Ok(_) => {
                            sent += 1;
                            tracing::trace!(peer = %self.peer_addr, len = message.len(), "fragment sent");
                        }
                        // Already past the transport's send(); the producer
                        // cannot be told. The receiver will evict the stream.
                        Err(e) => tracing::warn!(peer = %self.peer_addr, error = %e, "datagram send failed"),
                    }
                }
            }
        }
    }
}
