//! Transport port — the seam between homelink and whatever bus carries
//! fragment messages.
//!
//! Intentionally minimal. Implementations are expected to deliver each sent
//! fragment uncorrupted and at least once; ordering and exactly-once are not
//! assumed anywhere downstream.

use std::sync::Arc;

use homelink_core::{Fragment, WireError};

/// Called once per delivered fragment.
pub type FragmentHandler = Arc<dyn Fn(Fragment) + Send + Sync>;

pub trait TransportPort: Send + Sync {
    /// Hand one fragment to the bus.
    ///
    /// An `Ok` means the bus accepted it, not that anyone received it.
    fn send(&self, fragment: &Fragment) -> Result<(), TransportError>;

    /// Register a handler for incoming fragments. Every registered handler
    /// sees every fragment.
    fn on_receive(&self, handler: FragmentHandler);
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("failed to frame fragment: {0}")]
    Encode(#[from] WireError),

    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
