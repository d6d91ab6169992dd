//! homelinkd — receives fragmented payloads from the vehicle bus and stores
//! them, or sends one file to the configured peer.
//!
//! Usage:
//!   homelinkd                              run the receiver
//!   homelinkd send <path> [image|report]   send one payload and exit

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use homelink_core::config::HomelinkConfig;
use homelink_core::PayloadKind;
use homelink_services::{
    ChannelSink, ReassemblyLimits, StreamReassembler, Transfer, TransportPort,
};

mod bus;
mod sweep;
mod writer;

use bus::send_worker::SendWorker;
use bus::UdpTransport;

enum Mode {
    Receive,
    Send { path: PathBuf, kind: PayloadKind },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Mode> {
    match args.next().as_deref() {
        None => Ok(Mode::Receive),
        Some("send") => {
            let path = args
                .next()
                .map(PathBuf::from)
                .context("usage: homelinkd send <path> [image|report]")?;
            let kind = match args.next() {
                Some(k) => k.parse()?,
                None => PayloadKind::Image,
            };
            Ok(Mode::Send { path, kind })
        }
        Some(other) => anyhow::bail!("unknown command: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = HomelinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = HomelinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        HomelinkConfig::default()
    });

    match parse_args(std::env::args().skip(1))? {
        Mode::Receive => run_receiver(config).await,
        Mode::Send { path, kind } => run_send(config, path, kind).await,
    }
}

async fn run_receiver(config: HomelinkConfig) -> Result<()> {
    let bind_addr: SocketAddr = config
        .network
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind_addr {:?}", config.network.bind_addr))?;
    let peer_addr: SocketAddr = config
        .network
        .peer_addr
        .parse()
        .with_context(|| format!("invalid peer_addr {:?}", config.network.peer_addr))?;

    let socket = Arc::new(
        UdpSocket::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?,
    );
    tracing::info!(addr = %socket.local_addr()?, "homelinkd listening");

    let (transport, outbound_rx) = UdpTransport::new();
    let transport = Arc::new(transport);

    let (sink, completed_rx) = ChannelSink::new();
    let limits = ReassemblyLimits::from(&config.reassembly);
    let reassembler = Arc::new(StreamReassembler::new(Arc::new(sink), limits));
    reassembler.attach(transport.as_ref());
    tracing::info!(
        max_lifetime_secs = limits.max_lifetime.as_secs(),
        max_streams = limits.max_streams,
        max_stream_bytes = limits.max_stream_bytes,
        "reassembler ready"
    );

    let payload_dir = config.storage.payload_dir.clone();
    tracing::info!(path = %payload_dir.display(), "payload storage path");

    // ── Shutdown ─────────────────────────────────────────────────────────────

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received");
                let _ = tx.send(());
            }
        });
    }

    // ── Tasks ────────────────────────────────────────────────────────────────

    let receive_task = tokio::spawn(bus::receive::receive_loop(
        socket.clone(),
        transport.clone(),
        shutdown_tx.subscribe(),
    ));

    let send_worker_task = tokio::spawn(
        SendWorker::new(socket, peer_addr, outbound_rx, shutdown_tx.subscribe()).run(),
    );

    let sweep_task = tokio::spawn(sweep::sweep_loop(
        reassembler.clone(),
        config.reassembly.sweep_interval(),
        shutdown_tx.subscribe(),
    ));

    let writer_task = tokio::spawn(writer::writer_loop(
        payload_dir,
        completed_rx,
        shutdown_tx.subscribe(),
    ));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = receive_task        => tracing::error!("receive loop exited: {:?}", r),
        r = send_worker_task    => tracing::error!("send worker exited: {:?}", r),
        r = sweep_task          => tracing::error!("sweep loop exited: {:?}", r),
        r = writer_task         => tracing::error!("payload writer exited: {:?}", r),
    }

    let stats = reassembler.stats();
    tracing::info!(
        opened = stats.streams_opened,
        completed = stats.streams_completed,
        evicted = stats.streams_evicted,
        dropped_fragments = stats.fragments_dropped,
        in_flight = reassembler.table().len(),
        "homelinkd stopped"
    );
    Ok(())
}

async fn run_send(config: HomelinkConfig, path: PathBuf, kind: PayloadKind) -> Result<()> {
    let peer_addr: SocketAddr = config
        .network
        .peer_addr
        .parse()
        .with_context(|| format!("invalid peer_addr {:?}", config.network.peer_addr))?;
    let local: SocketAddr = if peer_addr.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };

    let payload = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let socket = Arc::new(
        UdpSocket::bind(local)
            .await
            .context("failed to bind send socket")?,
    );

    let (transport, outbound_rx) = UdpTransport::new();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let worker = tokio::spawn(
        SendWorker::new(socket, peer_addr, outbound_rx, shutdown_tx.subscribe()).run(),
    );

    let transport: Arc<dyn TransportPort> = Arc::new(transport);
    let transfer = Transfer::new(transport, config.transfer.chunk_size);
    let result = transfer.try_start_transfer(
        &config.transfer.producer_id,
        &config.transfer.producer_kind,
        kind,
        payload,
    );
    // Last transport handle; the worker drains the queue and exits.
    drop(transfer);

    let stream_id = result.with_context(|| format!("failed to send {}", path.display()))?;
    worker.await.context("send worker panicked")??;

    tracing::info!(
        stream_id = %stream_id,
        peer = %peer_addr,
        path = %path.display(),
        "payload sent"
    );
    Ok(())
}
