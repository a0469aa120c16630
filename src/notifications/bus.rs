//! Publish/subscribe bus for instrumentation events.
//!
//! Two kinds of consumers:
//! - listeners, called synchronously on the publishing thread, in subscription order
//! - streams, [`tokio::sync::broadcast`] receivers for async consumers
//!
//! Events must be registered before anyone can subscribe to them; publishing an
//! unregistered event is a no-op.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::notifications::event::{Event, Payload};

const STREAM_CAPACITY: usize = 1024;

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("event \"{name}\" is not registered on this bus")]
    UnknownEvent { name: String },
}

impl NotificationError {
    pub fn as_label(&self) -> &'static str {
        match self {
            NotificationError::UnknownEvent { .. } => "notifications_unknown_event",
        }
    }
}

/// Handle returned by [`Notifications::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The notifications bus.
pub struct Notifications {
    events: RwLock<BTreeSet<String>>,
    listeners: RwLock<HashMap<String, Vec<(SubscriptionId, Listener)>>>,
    next_id: AtomicU64,
    stream: broadcast::Sender<Event>,
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("events", &self.events())
            .finish()
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifications {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            events: RwLock::new(BTreeSet::new()),
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stream,
        }
    }

    /// Register an event name. Returns false if it was already registered.
    pub fn register_event(&self, name: &str) -> bool {
        self.events
            .write()
            .expect("notifications events poisoned")
            .insert(name.to_string())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.events
            .read()
            .expect("notifications events poisoned")
            .contains(name)
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<String> {
        self.events
            .read()
            .expect("notifications events poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Call `listener` for every published `name` event.
    pub fn subscribe<F>(&self, name: &str, listener: F) -> Result<SubscriptionId, NotificationError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        if !self.is_registered(name) {
            return Err(NotificationError::UnknownEvent {
                name: name.to_string(),
            });
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("notifications listeners poisoned")
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        Ok(id)
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().expect("notifications listeners poisoned");
        let mut removed = false;
        for list in listeners.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .read()
            .expect("notifications listeners poisoned")
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Receive every published event asynchronously.
    pub fn stream(&self) -> broadcast::Receiver<Event> {
        self.stream.subscribe()
    }

    /// Publish an event. Returns the number of listeners called.
    pub fn publish(&self, name: &str, payload: Payload) -> usize {
        if !self.is_registered(name) {
            tracing::trace!(event = %name, "Dropping unregistered event");
            return 0;
        }

        let event = Event::new(name, payload);
        // Listeners run without the lock held so they may subscribe or publish.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .expect("notifications listeners poisoned")
            .get(name)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in &listeners {
            listener(&event);
        }
        // No receivers is fine.
        let _ = self.stream.send(event);
        listeners.len()
    }

    /// A separate bus that starts with this bus's event names and no subscribers.
    ///
    /// Events published on either bus are never seen by the other.
    pub fn snapshot(&self) -> Notifications {
        let copy = Notifications::new();
        for name in self.events() {
            copy.register_event(&name);
        }
        copy
    }
}
