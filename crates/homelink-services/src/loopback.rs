//! In-process transport. Every sent fragment is framed to bytes, parsed
//! back, and handed synchronously to every registered handler, so the
//! full wire path runs without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use homelink_core::Fragment;

use crate::transport::{FragmentHandler, TransportError, TransportPort};

#[derive(Default)]
pub struct LoopbackTransport {
    handlers: RwLock<Vec<FragmentHandler>>,
    closed: AtomicBool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse all further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl TransportPort for LoopbackTransport {
    fn send(&self, fragment: &Fragment) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let message = fragment.to_bytes()?;
        let delivered = Fragment::from_bytes(message)?;

        // Snapshot the handlers so one may register another without deadlock.
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(delivered.clone());
        }
        Ok(())
    }

    fn on_receive(&self, handler: FragmentHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}
