//! Fan-out of cache changes to observers.
//!
//! Observers implement [`Subscriber`] and are held in a set keyed by `Arc`
//! identity. Delivery is synchronous, in no particular order, and isolated:
//! a subscriber that panics is logged and the rest still receive the event.
//!
//! # Example
//!
//! ```ignore
//! let hub = SubscriberHub::new();
//!
//! let subscription = hub.subscribe_fn(|event| println!("{:?}", event));
//! hub.publish(&NotificationEvent::Refresh);
//! subscription.unsubscribe();
//!
//! // Or pull events from a bounded channel
//! let channel = hub.subscribe_channel(64);
//! while let Ok(event) = channel.recv() {
//!     // ...
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriberHub;
pub use types::{ChannelSubscription, FnSubscriber, Subscriber, SubscriberId, Subscription};
