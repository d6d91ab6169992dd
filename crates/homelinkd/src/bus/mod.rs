//! UDP binding of the transport port — the daemon's stand-in for the
//! message bus. One fragment per datagram.
//!
//! `send` only frames and queues; the `SendWorker` owns the socket writes.
//! The receive loop parses datagrams and fans each fragment out to the
//! registered handlers.

pub mod receive;
pub mod send_worker;

use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use tokio::sync::mpsc;

use homelink_core::Fragment;
use homelink_services::{FragmentHandler, TransportError, TransportPort};

pub struct UdpTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    handlers: RwLock<Vec<FragmentHandler>>,
}

impl UdpTransport {
    /// Returns the transport and the queue a `SendWorker` should drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let transport = Self {
            outbound,
            handlers: RwLock::new(Vec::new()),
        };
        (transport, rx)
    }

    /// Deliver a received fragment to every handler.
    pub fn dispatch(&self, fragment: Fragment) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(fragment.clone());
        }
    }
}

impl TransportPort for UdpTransport {
    fn send(&self, fragment: &Fragment) -> Result<(), TransportError> {
        let message = fragment.to_bytes()?;
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn on_receive(&self, handler: FragmentHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}
