//! Subscribable event sources with explicit subscription handles

use std::fmt;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Opaque token returned by [`EventSource::subscribe`].
///
/// Passing it back to [`EventSource::unsubscribe`] is the only way to
/// remove a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single event signal that handlers can subscribe to.
///
/// Handlers run synchronously on the emitting thread, in subscription
/// order. Cloning an `EventSource` yields another handle to the same
/// subscriber list.
pub struct EventSource<E> {
    name: &'static str,
    handlers: Arc<RwLock<Vec<(SubscriptionHandle, Handler<E>)>>>,
}

impl<E> EventSource<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a handler and return the handle that revokes it.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(Uuid::new_v4());
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((handle, Arc::new(handler)));
        tracing::trace!(source = self.name, subscription = %handle, "Subscribed");
        handle
    }

    /// Remove a handler. Returns false if the handle was not subscribed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != handle);
        let removed = handlers.len() != before;
        if removed {
            tracing::trace!(source = self.name, subscription = %handle, "Unsubscribed");
        }
        removed
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: &E) -> usize {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler<E>> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_subscribed(&self, handle: SubscriptionHandle) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|(h, _)| *h == handle)
    }
}

impl<E> Clone for EventSource<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<E> fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("name", &self.name)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
