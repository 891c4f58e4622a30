//! Typed event fan-out
//!
//! Each event category (connection lifecycle, transport lifecycle, inbound
//! requests, notifications, payloads) gets its own [`EventHub`], so a
//! subscriber receives exactly one event type and matches it exhaustively.
//!
//! Subscribers are unbounded channels: emitting never blocks and never drops
//! an event for a live subscriber. A subscriber whose receiver has been
//! dropped is pruned on the next emit.
//!
//! ```rust
//! use rpclink_client::EventHub;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = EventHub::new();
//! let mut sub = hub.subscribe();
//!
//! assert_eq!(hub.emit("ready"), 1);
//! assert_eq!(sub.recv().await, Some("ready"));
//! # }
//! ```

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Identifies one subscription on a hub
pub type SubscriptionId = u64;

struct HubInner<E> {
    next_id: SubscriptionId,
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<E>)>,
}

/// Registry of subscribers for one event type
pub struct EventHub<E> {
    inner: Arc<Mutex<HubInner<E>>>,
}

impl<E> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Clone> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> EventHub<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 1,
                subscribers: Vec::new(),
            })),
        }
    }

    // Emitters never panic while holding the lock, so a poisoned lock still
    // holds a consistent subscriber list.
    fn lock(&self) -> MutexGuard<'_, HubInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription { id, rx }
    }

    /// Remove a subscriber; its receiver sees the end of the stream
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sub_id, _)| *sub_id != id);
        inner.subscribers.len() != before
    }

    /// Deliver `event` to every live subscriber, returning how many got it
    pub fn emit(&self, event: E) -> usize {
        let mut inner = self.lock();
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        inner.subscribers.len()
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscriber
    pub fn clear(&self) {
        self.lock().subscribers.clear();
    }
}

/// Receiving end of a hub subscription
pub struct Subscription<E> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, `None` once unsubscribed or the hub is gone
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.rx.poll_recv(cx)
    }
}
