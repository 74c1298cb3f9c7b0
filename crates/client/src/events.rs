//! In-process publish/subscribe for cross-component notifications.
//!
//! The set of topics is closed: [`Topic::CartChanged`] carries the new cart
//! snapshot, [`Topic::SessionExpired`] carries nothing. Handlers run
//! synchronously on the publishing thread, in subscription order. A handler
//! must not publish or mutate the store that published to it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use staxtrade_core::Cart;
use tracing::trace;

/// Notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    CartChanged,
    SessionExpired,
}

/// A published notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The cart was mutated and persisted; carries the new snapshot.
    CartChanged(Cart),
    /// Token refresh failed and the session was cleared.
    SessionExpired,
}

impl Event {
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::CartChanged(_) => Topic::CartChanged,
            Self::SessionExpired => Topic::SessionExpired,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Topic, Handler)>,
}

impl Registry {
    fn remove(&mut self, id: u64) {
        self.handlers.retain(|(handler_id, _, _)| *handler_id != id);
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to a shared event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or explicitly unsubscribed.
    #[must_use = "dropping the subscription unsubscribes the handler"]
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, topic, Arc::new(handler)));
        trace!(id, ?topic, "Handler subscribed");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every handler subscribed to its topic.
    ///
    /// Handlers registered or removed during delivery do not affect this
    /// delivery. Returns the number of handlers invoked.
    pub fn publish(&self, event: &Event) -> usize {
        let topic = event.topic();
        let handlers: Vec<Handler> = lock(&self.registry)
            .handlers
            .iter()
            .filter(|(_, t, _)| *t == topic)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        trace!(?topic, delivered = handlers.len(), "Event published");
        handlers.len()
    }

    /// Number of live handlers for `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        lock(&self.registry)
            .handlers
            .iter()
            .filter(|(_, t, _)| *t == topic)
            .count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.registry);
        f.debug_struct("EventBus")
            .field("handlers", &registry.handlers.len())
            .finish()
    }
}

/// Guard for a registered handler.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the handler now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.id);
            trace!(id = self.id, "Handler unsubscribed");
        }
    }
}
