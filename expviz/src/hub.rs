//! Broadcast hub: one producer, many subscribers, with a bounded backlog
//! replayed to every subscriber that joins late.
//!
//! All hub operations take the same lock, so a `subscribe` is ordered strictly
//! before or after any `publish`: the seeded backlog and the live stream meet
//! without a gap or a duplicate. Each subscriber has its own bounded queue; a
//! subscriber whose live queue fills up is dropped instead of stalling the
//! producer.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::types::Snapshot;

pub type SnapshotHub = Hub<Snapshot>;
pub type SnapshotSubscription = Subscription<Snapshot>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("broadcast hub is closed")]
pub struct HubClosed;

/// Identity of one subscription; unique for the lifetime of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Producer-facing side of a hub.
pub trait Publish<T> {
    /// Hand one item to every subscriber. Returns how many received it.
    fn publish(&self, item: T) -> Result<usize, HubClosed>;

    /// True once no further publish can succeed.
    fn is_closed(&self) -> bool;
}

struct State<T> {
    backlog: VecDeque<Arc<T>>,
    subscribers: HashMap<SubscriptionId, mpsc::Sender<Arc<T>>>,
    closed: bool,
}

struct Shared<T> {
    capacity: usize,
    next_id: AtomicU64,
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Nothing inside the critical sections can leave State half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.remove(&id).is_some()
    }
}

/// Cloneable handle to a broadcast hub.
pub struct Hub<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Hub<T> {
    /// Hub keeping the most recent `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                capacity,
                next_id: AtomicU64::new(1),
                state: Mutex::new(State {
                    backlog: VecDeque::with_capacity(capacity),
                    subscribers: HashMap::new(),
                    closed: false,
                }),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Append to the backlog and fan out to every live subscriber.
    ///
    /// Never waits on a subscriber: one whose queue is full is dropped and
    /// will see end-of-stream once it drains what it already has.
    pub fn publish(&self, item: T) -> Result<usize, HubClosed> {
        let item = Arc::new(item);
        let mut state = self.shared.lock();
        if state.closed {
            return Err(HubClosed);
        }
        if state.backlog.len() == self.shared.capacity {
            state.backlog.pop_front();
        }
        state.backlog.push_back(Arc::clone(&item));

        let mut delivered = 0;
        state.subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&item)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscription = %id, "subscriber queue full; dropping slow consumer");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscription = %id, "subscriber went away");
                false
            }
        });
        Ok(delivered)
    }

    /// Register a new subscriber, seeded with the current backlog (oldest first).
    pub fn subscribe(&self) -> Result<Subscription<T>, HubClosed> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(HubClosed);
        }
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        // Seeded items do not count against the live budget.
        let (tx, rx) = mpsc::channel(state.backlog.len() + self.shared.capacity);
        for item in &state.backlog {
            if tx.try_send(Arc::clone(item)).is_err() {
                break;
            }
        }
        state.subscribers.insert(id, tx);
        debug!(subscription = %id, backlog = state.backlog.len(), "subscribed");
        Ok(Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.shared),
            closed: false,
        })
    }

    /// Deregister a subscriber. Its consumer sees end-of-stream after draining
    /// what is already queued. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.shared.remove(id);
        if removed {
            debug!(subscription = %id, "unsubscribed");
        }
        removed
    }

    /// Close the hub and end every subscription. Idempotent.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let n = state.subscribers.len();
        // Dropping the senders is the terminal marker for each queue.
        state.subscribers.clear();
        info!(subscribers = n, "broadcast hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn backlog_len(&self) -> usize {
        self.shared.lock().backlog.len()
    }

    /// Most recently published item, if any.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.shared.lock().backlog.back().cloned()
    }
}

impl<T> Publish<T> for Hub<T> {
    fn publish(&self, item: T) -> Result<usize, HubClosed> {
        Hub::publish(self, item)
    }

    fn is_closed(&self) -> bool {
        Hub::is_closed(self)
    }
}

/// A single consumer's ordered view of the hub.
///
/// Dropping a subscription unsubscribes it.
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::Receiver<Arc<T>>,
    hub: Weak<Shared<T>>,
    closed: bool,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next item in publish order, or `None` once the stream has ended.
    /// After the first `None` every call returns `None` immediately.
    pub async fn next(&mut self) -> Option<Arc<T>> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(item) => Some(item),
            None => {
                self.closed = true;
                None
            }
        }
    }

    /// End this subscription now, discarding anything still queued.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}
