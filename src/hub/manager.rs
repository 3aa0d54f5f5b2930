//! Subscriber registry and broadcasting.

use crate::types::NotificationEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{
    ChannelSubscriber, ChannelSubscription, FnSubscriber, Subscriber, SubscriberId, Subscription,
};

/// Shared registration table. Subscription handles hold a weak reference.
pub(crate) struct Registry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }
}

fn same_subscriber(a: &Arc<dyn Subscriber>, b: &Arc<dyn Subscriber>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Registry of observers; publishes cache-change events to all of them.
pub struct SubscriberHub {
    registry: Arc<Registry>,
}

impl SubscriberHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a subscriber.
    ///
    /// Subscribing an `Arc` that is already registered returns the existing
    /// registration instead of adding a second one.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Subscription {
        let mut subs = self.registry.subscribers.write();

        let existing = subs
            .iter()
            .find(|(_, registered)| same_subscriber(registered, &subscriber))
            .map(|(id, _)| *id);

        let id = match existing {
            Some(id) => id,
            None => {
                let id = SubscriberId(self.registry.next_id.fetch_add(1, Ordering::SeqCst));
                subs.insert(id, subscriber);
                id
            }
        };

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register a closure.
    pub fn subscribe_fn<F>(&self, f: F) -> Subscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber(f)))
    }

    /// Register a bounded channel. If the reader falls more than
    /// `buffer_size` events behind, the subscription is dropped.
    pub fn subscribe_channel(&self, buffer_size: usize) -> ChannelSubscription {
        let (sender, receiver) = crossbeam_channel::bounded(buffer_size.max(1));
        let subscription = self.subscribe(Arc::new(ChannelSubscriber::new(sender)));

        ChannelSubscription {
            subscription,
            receiver,
        }
    }

    /// Remove a registration by id.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.registry.remove(id)
    }

    /// Remove every registration.
    pub fn clear(&self) {
        let removed = {
            let mut subs = self.registry.subscribers.write();
            let count = subs.len();
            subs.clear();
            count
        };
        debug!(removed, "cleared subscribers");
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registry.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// No lock is held while a subscriber runs, so subscribers may call back
    /// into the hub or the client. A subscriber removed by an earlier one
    /// during the same publish does not receive the event.
    pub fn publish(&self, event: &NotificationEvent) {
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .registry
            .subscribers
            .read()
            .iter()
            .map(|(id, sub)| (*id, Arc::clone(sub)))
            .collect();

        let mut to_remove = Vec::new();

        for (id, subscriber) in targets {
            if !self.registry.contains(id) {
                continue;
            }

            let delivered = catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event)));
            if delivered.is_err() {
                warn!(subscriber = id.0, "subscriber panicked while handling event");
            }

            if subscriber.is_closed() {
                to_remove.push(id);
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.registry.subscribers.write();
            for id in to_remove {
                subs.remove(&id);
            }
        }
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationRecord;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn added(id: &str) -> NotificationEvent {
        NotificationEvent::Added {
            record: NotificationRecord {
                id: id.to_string(),
                payload: json!({}),
                timestamp: "2024-01-01T00:00:00.000Z".to_string(),
                read: false,
            },
        }
    }

    struct Counter(AtomicUsize);

    impl Subscriber for Counter {
        fn on_event(&self, _event: &NotificationEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let hub = SubscriberHub::new();

        let subscription = hub.subscribe_fn(|_| {});
        assert_eq!(hub.len(), 1);
        assert!(subscription.is_active());

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert_eq!(hub.len(), 0);
    }

    #[test]
    fn test_same_arc_registers_once() {
        let hub = SubscriberHub::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        let first = hub.subscribe(counter.clone());
        let second = hub.subscribe(counter.clone());
        assert_eq!(first.id, second.id);
        assert_eq!(hub.len(), 1);

        hub.publish(&NotificationEvent::Refresh);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // Distinct values are distinct registrations
        hub.subscribe(Arc::new(Counter(AtomicUsize::new(0))));
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_publish_reaches_all() {
        let hub = SubscriberHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            let seen = seen.clone();
            hub.subscribe_fn(move |event| {
                seen.lock().push(event.record().map(|r| r.id.clone()));
            });
        }

        hub.publish(&added("n1"));
        hub.publish(&NotificationEvent::Refresh);

        let seen = seen.lock();
        assert_eq!(seen.iter().filter(|e| e.as_deref() == Some("n1")).count(), 3);
        assert_eq!(seen.iter().filter(|e| e.is_none()).count(), 3);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let hub = SubscriberHub::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        hub.subscribe_fn(|_| panic!("subscriber bug"));
        hub.subscribe(counter.clone());

        hub.publish(&NotificationEvent::Refresh);
        hub.publish(&NotificationEvent::Refresh);

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_clear_stops_delivery() {
        let hub = SubscriberHub::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        hub.subscribe(counter.clone());

        hub.clear();
        hub.publish(&NotificationEvent::Refresh);

        assert!(hub.is_empty());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscriber_may_reenter_hub() {
        let hub = Arc::new(SubscriberHub::new());
        let inner = hub.clone();
        hub.subscribe_fn(move |_| {
            // Would deadlock if publish held the registry lock.
            let _ = inner.len();
            inner.subscribe_fn(|_| {});
        });

        hub.publish(&NotificationEvent::Refresh);
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_channel_subscription() {
        let hub = SubscriberHub::new();
        let channel = hub.subscribe_channel(8);

        hub.publish(&added("n1"));

        let event = channel.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.record().unwrap().id, "n1");
        assert!(channel.try_recv().is_err());
    }

    #[test]
    fn test_drop_slow_channel_subscriber() {
        let hub = SubscriberHub::new();
        let channel = hub.subscribe_channel(2);

        for i in 0..10 {
            hub.publish(&added(&i.to_string()));
        }

        assert_eq!(hub.len(), 0);
        assert!(!channel.subscription.is_active());
        // Buffered events are still readable, then the channel disconnects.
        assert!(channel.try_recv().is_ok());
        assert!(channel.try_recv().is_ok());
        assert!(matches!(
            channel.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_dropped_receiver_is_removed() {
        let hub = SubscriberHub::new();
        let channel = hub.subscribe_channel(4);
        drop(channel);

        hub.publish(&NotificationEvent::Refresh);
        assert_eq!(hub.len(), 0);
    }
}
