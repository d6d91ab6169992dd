//! Payload writer — persists completed streams under the storage directory
//! as `<payload_dir>/<producer_id>/<stream_id>.<ext>`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};

use homelink_services::CompletedPayload;

/// Producer ids arrive off the wire; keep them to a single path component.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}

pub fn payload_path(root: &Path, payload: &CompletedPayload) -> PathBuf {
    root.join(sanitize_component(&payload.producer_id)).join(format!(
        "{}.{}",
        payload.stream_id,
        payload.payload_kind.extension()
    ))
}

pub async fn write_payload(root: &Path, payload: &CompletedPayload) -> Result<PathBuf> {
    let path = payload_path(root, payload);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&path, &payload.data)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub async fn writer_loop(
    root: PathBuf,
    mut rx: mpsc::UnboundedReceiver<CompletedPayload>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let payload = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("payload writer shutting down");
                return;
            }
            p = rx.recv() => match p {
                Some(p) => p,
                None => return,
            },
        };

        match write_payload(&root, &payload).await {
            Ok(path) => tracing::info!(
                stream_id = %payload.stream_id,
                producer_id = %payload.producer_id,
                producer_kind = %payload.producer_kind,
                kind = %payload.payload_kind,
                bytes = payload.data.len(),
                path = %path.display(),
                "payload stored"
            ),
            Err(e) => tracing::error!(
                stream_id = %payload.stream_id,
                error = %e,
                "failed to store payload"
            ),
        }
    }
}
