use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;

use homelink_core::Fragment;
use homelink_services::{FragmentHandler, TransportError, TransportPort};

// ── HeldTransport — captures sends, delivers on demand ───────────────────────

/// A transport that holds every sent fragment until the test releases them,
/// so delivery can be reordered, duplicated, or dropped. Optionally fails
/// every send after the first `fail_after`.
#[derive(Default)]
pub struct HeldTransport {
    held: Mutex<Vec<Fragment>>,
    handlers: Mutex<Vec<FragmentHandler>>,
    fail_after: Option<usize>,
    attempts: AtomicUsize,
}

impl HeldTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_after(sends: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_after: Some(sends),
            ..Self::default()
        })
    }

    /// Number of `send` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn held(&self) -> Vec<Fragment> {
        self.held.lock().unwrap().clone()
    }

    /// Take the held fragments, let `arrange` reshape the delivery list,
    /// then deliver it in order.
    pub fn release_with(&self, arrange: impl FnOnce(Vec<Fragment>) -> Vec<Fragment>) {
        let held = std::mem::take(&mut *self.held.lock().unwrap());
        let handlers = self.handlers.lock().unwrap().clone();
        for fragment in arrange(held) {
            for handler in &handlers {
                handler(fragment.clone());
            }
        }
    }

    pub fn release(&self) {
        self.release_with(|f| f);
    }

    pub fn release_reversed(&self) {
        self.release_with(|mut f| {
            f.reverse();
            f
        });
    }

    pub fn release_shuffled(&self) {
        self.release_with(|mut f| {
            f.shuffle(&mut rand::thread_rng());
            f
        });
    }

    /// Every fragment twice, the second copies in reverse after the first pass.
    pub fn release_duplicated(&self) {
        self.release_with(|f| {
            let mut twice = f.clone();
            twice.extend(f.into_iter().rev());
            twice
        });
    }

    /// Deliver everything except the fragment with sequence `missing`.
    pub fn release_dropping(&self, missing: u32) {
        self.release_with(|f| f.into_iter().filter(|x| x.sequence != missing).collect());
    }
}

impl TransportPort for HeldTransport {
    fn send(&self, fragment: &Fragment) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| attempt >= limit) {
            return Err(TransportError::Closed);
        }
        self.held.lock().unwrap().push(fragment.clone());
        Ok(())
    }

    fn on_receive(&self, handler: FragmentHandler) {
        self.handlers.lock().unwrap().push(handler);
    }
}
