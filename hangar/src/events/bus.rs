//! Topic-scoped event bus
//!
//! Every subscriber owns a bounded queue. `publish` pushes into the queues of
//! the topic's current members without waiting; a full queue drops the event
//! for that subscriber only. Nothing is retained for subscribers that join
//! later, so consumers re-fetch authoritative state after (re)joining.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use openapi_server::models::{Event, EventType, Topic};

/// Subscriber identifier
pub type SubscriberId = u64;

/// Default per-subscriber queue length
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    sender: mpsc::Sender<Event>,
    topics: HashSet<Topic>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, Subscriber>,
    rooms: HashMap<Topic, Vec<SubscriberId>>,
}

impl Registry {
    fn add(&mut self, sender: mpsc::Sender<Event>) -> SubscriberId {
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.insert(
            id,
            Subscriber {
                sender,
                topics: HashSet::new(),
            },
        );
        id
    }

    fn join(&mut self, id: SubscriberId, topic: Topic) -> bool {
        let Some(subscriber) = self.subscribers.get_mut(&id) else {
            return false;
        };
        if !subscriber.topics.insert(topic.clone()) {
            return false;
        }
        self.rooms.entry(topic).or_default().push(id);
        true
    }

    fn leave(&mut self, id: SubscriberId, topic: &Topic) -> bool {
        let Some(subscriber) = self.subscribers.get_mut(&id) else {
            return false;
        };
        if !subscriber.topics.remove(topic) {
            return false;
        }
        self.remove_from_room(id, topic);
        true
    }

    fn remove(&mut self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.remove(&id) {
            for topic in &subscriber.topics {
                self.remove_from_room(id, topic);
            }
        }
    }

    fn remove_from_room(&mut self, id: SubscriberId, topic: &Topic) {
        if let Some(members) = self.rooms.get_mut(topic) {
            members.retain(|m| *m != id);
            if members.is_empty() {
                self.rooms.remove(topic);
            }
        }
    }
}

/// In-process event bus
pub struct EventBus {
    registry: Mutex<Registry>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscribers buffer at most `capacity` undelivered events
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            capacity: capacity.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver an event to the current members of `topic`.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, topic: Topic, event_type: EventType, payload: serde_json::Value) -> usize {
        let mut registry = self.registry();

        let Some(members) = registry.rooms.get(&topic).cloned() else {
            debug!("No subscribers for {}, dropping {:?}", topic, event_type);
            return 0;
        };

        let event = Event {
            topic,
            event_type,
            payload,
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for id in members {
            let Some(subscriber) = registry.subscribers.get(&id) else {
                continue;
            };
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Subscriber {} is lagging, dropped {:?} on {}",
                        id, event.event_type, event.topic
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            debug!("Removing closed subscriber {}", id);
            registry.remove(id);
        }

        delivered
    }

    /// Run `handler` for every event published on `topic`.
    ///
    /// The handler runs on its own task; a panic inside it is logged and the
    /// subscription keeps receiving later events.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let (sender, mut receiver) = mpsc::channel(self.capacity);
        let id = {
            let mut registry = self.registry();
            let id = registry.add(sender);
            registry.join(id, topic.clone());
            id
        };

        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                    warn!(
                        "Subscriber {} handler panicked on {:?} ({})",
                        id, event.event_type, event.topic
                    );
                }
            }
        });

        debug!("Subscriber {} subscribed to {}", id, topic);
        SubscriptionHandle { id, task }
    }

    /// Stop a handler subscription
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.registry().remove(handle.id);
        debug!("Subscriber {} unsubscribed", handle.id);
    }

    /// Open a connection-scoped subscriber with room membership
    pub fn connect(self: &Arc<Self>) -> BusConnection {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.registry().add(sender);
        debug!("Connection {} opened", id);
        BusConnection {
            id,
            bus: self.clone(),
            receiver,
        }
    }

    /// Add a subscriber to a room; false if already a member or unknown
    pub fn join(&self, id: SubscriberId, topic: Topic) -> bool {
        self.registry().join(id, topic)
    }

    /// Remove a subscriber from a room; false if it was not a member
    pub fn leave(&self, id: SubscriberId, topic: &Topic) -> bool {
        self.registry().leave(id, topic)
    }

    /// Drop a subscriber and every room membership it holds
    pub fn disconnect(&self, id: SubscriberId) {
        self.registry().remove(id);
    }

    /// Number of subscribers currently in a room
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.registry().rooms.get(topic).map_or(0, Vec::len)
    }

    /// Rooms a subscriber currently belongs to
    pub fn topics_of(&self, id: SubscriberId) -> Vec<Topic> {
        self.registry()
            .subscribers
            .get(&id)
            .map(|s| s.topics.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

/// Handle for a handler subscription
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriberId,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait until every queued event has been handled after unsubscribing
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

/// Connection-scoped subscriber; dropping it leaves every joined room
pub struct BusConnection {
    id: SubscriberId,
    bus: Arc<EventBus>,
    receiver: mpsc::Receiver<Event>,
}

impl BusConnection {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn join(&self, topic: Topic) -> bool {
        self.bus.join(self.id, topic)
    }

    pub fn leave(&self, topic: &Topic) -> bool {
        self.bus.leave(self.id, topic)
    }

    /// Next event on any joined room
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        self.bus.disconnect(self.id);
        debug!("Connection {} closed", self.id);
    }
}
