//! Subscriber types.

use crate::types::NotificationEvent;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use tracing::warn;

use super::manager::Registry;

/// Unique identifier for a registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

/// An observer of cache changes.
pub trait Subscriber: Send + Sync {
    /// Called synchronously for every published event.
    fn on_event(&self, event: &NotificationEvent);

    /// A closed subscriber is removed from the hub after the current publish.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Adapts a closure into a [`Subscriber`].
pub struct FnSubscriber<F>(pub F);

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&NotificationEvent) + Send + Sync,
{
    fn on_event(&self, event: &NotificationEvent) {
        (self.0)(event)
    }
}

/// Forwards events into a bounded channel; closes itself when the
/// receiver lags behind or goes away.
pub(crate) struct ChannelSubscriber {
    sender: crossbeam_channel::Sender<NotificationEvent>,
    closed: AtomicBool,
}

impl ChannelSubscriber {
    pub(crate) fn new(sender: crossbeam_channel::Sender<NotificationEvent>) -> Self {
        Self {
            sender,
            closed: AtomicBool::new(false),
        }
    }
}

impl Subscriber for ChannelSubscriber {
    fn on_event(&self, event: &NotificationEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                warn!("channel subscriber buffer full, dropping subscriber");
                self.closed.store(true, Ordering::SeqCst);
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                self.closed.store(true, Ordering::SeqCst);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Unsubscribe capability returned by the hub.
///
/// Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    pub id: SubscriberId,
    pub(crate) registry: Weak<Registry>,
}

impl Subscription {
    /// Remove the registration. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }

    /// Whether the hub still holds this registration.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.contains(self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A subscription read through a bounded channel.
pub struct ChannelSubscription {
    pub subscription: Subscription,
    /// Channel to receive events. Disconnects once the hub drops the subscriber.
    pub receiver: crossbeam_channel::Receiver<NotificationEvent>,
}

impl ChannelSubscription {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<NotificationEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<NotificationEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<NotificationEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn unsubscribe(&self) -> bool {
        self.subscription.unsubscribe()
    }
}
