//! Broadcast hub: fan-out of parsed messages to subscriber queues.
//!
//! The hub decouples the single inbound stream from any number of
//! consumers, each progressing at its own pace over a private, ordered,
//! bounded queue.
//!
//! Back-pressure policy: **drop-oldest**. Every subscription is backed
//! by its own `tokio::sync::broadcast` channel, so a consumer that
//! falls behind its capacity observes [`RecvError::Lagged`] and resumes
//! at the oldest retained message. Publishing never blocks; a slow
//! handler can therefore never stall the reader loop into missing a
//! PING deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slirc_line::Message;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::RecvError;

/// Fan-out hub for inbound messages.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
}

struct Slot {
    id: u64,
    tx: broadcast::Sender<Arc<Message>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                slots: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a new subscriber with a private queue of `capacity`.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots.lock().push(Slot { id, tx });
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a message to every currently subscribed queue.
    ///
    /// Queues whose subscriber has gone away are pruned as a side
    /// effect; delivery to the remaining subscribers is unaffected.
    pub fn publish(&self, message: Arc<Message>) {
        self.inner
            .slots
            .lock()
            .retain(|slot| slot.tx.send(Arc::clone(&message)).is_ok());
    }

    /// Number of live subscriber queues.
    pub fn subscriber_count(&self) -> usize {
        self.inner.slots.lock().len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// A private subscriber queue handle.
///
/// Dropping the subscription removes its queue from the hub; no
/// further messages are delivered to it.
pub struct Subscription {
    id: u64,
    rx: broadcast::Receiver<Arc<Message>>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Receive the next message in wire order.
    ///
    /// Returns [`RecvError::Lagged`] with the number of dropped
    /// messages when this subscriber fell behind its queue capacity,
    /// and [`RecvError::Closed`] once the hub is gone.
    pub async fn recv(&mut self) -> Result<Arc<Message>, RecvError> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining in tests.
    pub fn try_recv(&mut self) -> Result<Arc<Message>, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.slots.lock().retain(|slot| slot.id != self.id);
        }
    }
}
