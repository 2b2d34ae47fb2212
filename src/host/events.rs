//! Fan-out of runtime lifecycle events.
//!
//! Every subscriber owns a bounded queue. Publishing never waits: when a subscriber's
//! queue is full the new event is dropped for that subscriber alone, counted, and
//! logged. Subscribers whose receiver is gone are pruned on the next publish. There is
//! no replay; a subscriber sees only what is published after it subscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::protocol::CapabilityTee;
use crate::types::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedEvent {
    pub version: Version,
    pub capability_tee: Option<CapabilityTee>,
}

/// Lifecycle transition of a hosted runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(StartedEvent),
    Stopped,
    FailedToStart { reason: String },
    /// The runtime re-attested and its TEE capability changed.
    Updated { capability_tee: Option<CapabilityTee> },
}

type Registry<T> = Mutex<HashMap<Uuid, mpsc::Sender<T>>>;

fn lock<T>(registry: &Registry<T>) -> MutexGuard<'_, HashMap<Uuid, mpsc::Sender<T>>> {
    // The map is valid after any panic mid-update, so a poisoned lock is still usable.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Publish/subscribe broker with per-subscriber bounded queues.
#[derive(Debug)]
pub struct Broker<T> {
    registry: Arc<Registry<T>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T: Clone + Send + 'static> Broker<T> {
    /// `capacity` is the queue length of each subscriber (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        Broker {
            registry: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> (mpsc::Receiver<T>, Subscription<T>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        lock(&self.registry).insert(id, tx);
        tracing::trace!(subscription = %id, "subscribed");
        (rx, Subscription { id, registry: Arc::downgrade(&self.registry) })
    }

    /// Publishes `item` to every current subscriber and returns how many queued it.
    pub fn broadcast(&self, item: T) -> usize {
        let mut registry = lock(&self.registry);
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in registry.iter() {
            match tx.try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(subscription = %id, "subscriber queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            registry.remove(&id);
            tracing::trace!(subscription = %id, "pruned closed subscriber");
        }
        delivered
    }

    pub fn subscribers(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Events dropped because a subscriber's queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle that cancels one subscription.
///
/// Dropping the handle does not unsubscribe; dropping the receiver does, lazily.
#[derive(Debug)]
pub struct Subscription<T> {
    id: Uuid,
    registry: Weak<Registry<T>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Unsubscribes. The receiver yields what is already queued, then `None`.
    pub fn close(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if lock(&registry).remove(&self.id).is_some() {
                tracing::trace!(subscription = %self.id, "unsubscribed");
            }
        }
    }
}

pub type EventSubscription = Subscription<Event>;
