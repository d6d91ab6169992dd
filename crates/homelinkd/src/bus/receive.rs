use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use homelink_core::wire::MAX_MESSAGE;
use homelink_core::Fragment;

use super::UdpTransport;

pub async fn receive_loop(
    socket: Arc<UdpSocket>,
    transport: Arc<UdpTransport>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_MESSAGE + 1];

    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("receive loop shutting down");
                return Ok(());
            }
            r = socket.recv_from(&mut buf) => r.context("recv_from failed")?,
        };

        if len > MAX_MESSAGE {
            tracing::warn!(%peer, len, "oversized datagram, discarding");
            continue;
        }

        let fragment = match Fragment::from_bytes(Bytes::copy_from_slice(&buf[..len])) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(%peer, len, error = %e, "unparseable datagram, discarding");
                continue;
            }
        };

        tracing::trace!(
            %peer,
            stream = %fragment.stream_id.short(),
            sequence = fragment.sequence,
            len,
            "fragment received"
        );
        transport.dispatch(fragment);
    }
}
