use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::DeliveryError;

use super::Envelope;

/// In-memory bus for tests and single-process scenarios.
///
/// Thread-safe and cheap to clone; clones share the same queue. Every
/// published envelope is also kept in an append-only log for assertions.
///
/// ## Example
///
/// ```
/// use sourced_outbox::bus::{Envelope, InMemoryBus};
///
/// let bus = InMemoryBus::new();
/// bus.publish(Envelope::with_string_payload("evt-1", "OrderCreated", r#"{"id":"123"}"#)).unwrap();
///
/// let envelope = bus.poll().unwrap().unwrap();
/// assert_eq!(envelope.type_tag, "OrderCreated");
/// assert!(bus.poll().unwrap().is_none());
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    queue: Arc<Mutex<VecDeque<Envelope>>>,
    log: Arc<RwLock<Vec<Envelope>>>,
    fail_next: Arc<AtomicUsize>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            log: Arc::new(RwLock::new(Vec::new())),
            fail_next: Arc::new(AtomicUsize::new(0)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn publish(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        if !self.is_available() {
            return Err(DeliveryError::ConnectionFailed("bus unavailable".into()));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DeliveryError::ConnectionFailed(format!(
                "injected failure publishing {}",
                envelope.id
            )));
        }

        self.log
            .write()
            .map_err(|_| DeliveryError::Rejected("bus log poisoned".into()))?
            .push(envelope.clone());
        self.queue
            .lock()
            .map_err(|_| DeliveryError::Rejected("bus queue poisoned".into()))?
            .push_back(envelope);
        Ok(())
    }

    /// Take the next envelope, if any.
    pub fn poll(&self) -> Result<Option<Envelope>, DeliveryError> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| DeliveryError::Rejected("bus queue poisoned".into()))?;
        Ok(queue.pop_front())
    }

    /// Put a copy of an already delivered envelope back on the queue, as a
    /// broker does after a lost ack.
    pub fn redeliver(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        self.queue
            .lock()
            .map_err(|_| DeliveryError::Rejected("bus queue poisoned".into()))?
            .push_back(envelope);
        Ok(())
    }

    /// Make the next `count` publishes fail with a connection error.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Every envelope ever published, in publish order.
    pub fn published(&self) -> Vec<Envelope> {
        self.log
            .read()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Envelopes waiting to be polled.
    pub fn len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
