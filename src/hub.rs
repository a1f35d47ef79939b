// =============================================================================
// Subscription Hub — fan-out with per-subscriber coalescing queues
// =============================================================================
//
// Tracks screener-wide and single-symbol subscribers and delivers updates
// from any symbol worker without ever blocking the ingestion path:
//
//   - publish() enqueues into each matching subscriber's bounded queue and
//     returns immediately; network delivery happens on the subscriber's own
//     writer task draining that queue.
//   - When a queue is full the oldest pending update is replaced by the
//     newest (coalescing) — subscribers care about current state, not the
//     intermediate ticks they missed.
//   - A slow or dead subscriber affects only its own queue. Closed
//     subscribers are pruned lazily on the next failed delivery.
//   - unsubscribe() is safe concurrently with an in-flight publish: the
//     registry entry is removed under the write lock while any publisher
//     still holding the Arc simply sees a closed queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use crate::alerts::Alert;
use crate::indicators::IndicatorSnapshot;
use crate::signals::Signal;
use crate::types::Tick;

/// Pending updates retained per subscriber before coalescing kicks in.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Update payloads
// ---------------------------------------------------------------------------

/// Full per-symbol update for detail viewers: the tick, the fresh
/// indicators, the derived signal, and whichever alerts fired on this tick.
#[derive(Debug, Clone, Serialize)]
pub struct DetailUpdate {
    pub tick: Tick,
    pub indicators: IndicatorSnapshot,
    pub signal: Signal,
    pub alerts: Vec<Alert>,
}

/// Delta update for screener viewers: one message per changed symbol
/// carrying only the fields that changed since that symbol's previous
/// publish.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenerUpdate {
    pub symbol: String,
    pub updated_fields: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// What a subscriber drains from its queue.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HubMessage {
    Detail(DetailUpdate),
    Screener(ScreenerUpdate),
}

/// What a subscriber wants to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberKind {
    /// Every symbol's screener deltas.
    Screener,
    /// Full detail updates for one symbol.
    Symbol(String),
}

// ---------------------------------------------------------------------------
// Coalescing queue
// ---------------------------------------------------------------------------

/// Bounded MPSC queue that drops the oldest pending item instead of
/// blocking when full. Push is safe from many producers; recv is intended
/// for the single writer task that owns the subscription.
#[derive(Debug)]
pub struct CoalescingQueue<T> {
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl<T> CoalescingQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue an item, coalescing away the oldest pending one when the
    /// queue is at capacity. Returns `false` if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        {
            let mut queue = self.inner.lock();
            if queue.len() == self.capacity {
                queue.pop_front();
            }
            queue.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Await the next item. Returns `None` once the queue is closed and
    /// drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut queue = self.inner.lock();
                if let Some(item) = queue.pop_front() {
                    return Some(item);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            // notify_one stores a permit when nobody is waiting yet, so a
            // push racing this await still wakes us.
            self.notify.notified().await;
        }
    }

    /// Close the queue. Pending items remain drainable; further pushes fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

struct SubscriberEntry {
    kind: SubscriberKind,
    queue: Arc<CoalescingQueue<HubMessage>>,
}

/// Registry of live subscribers. Shared across every symbol worker and
/// every connection handler.
pub struct SubscriptionHub {
    subscribers: RwLock<HashMap<u64, SubscriberEntry>>,
    next_id: AtomicU64,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber and hand back its drain handle.
    pub fn subscribe(self: &Arc<Self>, kind: SubscriberKind) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(CoalescingQueue::new(SUBSCRIBER_QUEUE_DEPTH));

        self.subscribers.write().insert(
            id,
            SubscriberEntry {
                kind: kind.clone(),
                queue: queue.clone(),
            },
        );

        debug!(id, ?kind, "subscriber registered");
        SubscriptionHandle {
            id,
            queue,
            hub: self.clone(),
        }
    }

    /// Remove a subscriber and close its queue. Idempotent; safe to race
    /// with publish.
    pub fn unsubscribe(&self, id: u64) {
        if let Some(entry) = self.subscribers.write().remove(&id) {
            entry.queue.close();
            debug!(id, "subscriber removed");
        }
    }

    /// Deliver one tick's updates: the detail payload to matching
    /// single-symbol subscribers, the screener delta to every screener-wide
    /// subscriber. Never blocks on subscriber I/O.
    pub fn publish(&self, symbol: &str, detail: &DetailUpdate, screener: &ScreenerUpdate) {
        let mut dead: Vec<u64> = Vec::new();

        {
            let subs = self.subscribers.read();
            for (&id, entry) in subs.iter() {
                let delivered = match &entry.kind {
                    SubscriberKind::Screener => {
                        entry.queue.push(HubMessage::Screener(screener.clone()))
                    }
                    SubscriberKind::Symbol(s) if s == symbol => {
                        entry.queue.push(HubMessage::Detail(detail.clone()))
                    }
                    SubscriberKind::Symbol(_) => continue,
                };
                if !delivered {
                    dead.push(id);
                }
            }
        }

        // Lazy pruning: entries whose queue was closed under them.
        if !dead.is_empty() {
            let mut subs = self.subscribers.write();
            for id in dead {
                subs.remove(&id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Drain side of one subscription. Dropping the handle unsubscribes, so a
/// disconnecting transport cannot leak its queue.
pub struct SubscriptionHandle {
    id: u64,
    queue: Arc<CoalescingQueue<HubMessage>>,
    hub: Arc<SubscriptionHub>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued update, or `None` after unsubscribe.
    pub async fn recv(&self) -> Option<HubMessage> {
        self.queue.recv().await
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
