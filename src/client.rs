//! The notification client facade.
//!
//! Wires the connection manager, the cache and the subscriber hub together.
//! Inbound events mutate the cache and then fan out; local read-state
//! changes are applied first and echoed to the source on a best-effort basis.

use crate::cache::NotificationCache;
use crate::config::ClientConfig;
use crate::connection::{ChannelHandler, ConnectionManager};
use crate::credentials::CredentialProvider;
use crate::error::{ClientError, Result};
use crate::hub::{ChannelSubscription, Subscriber, SubscriberHub, Subscription};
use crate::store::PersistentStore;
use crate::transport::Connector;
use crate::types::{ConnectionState, IncomingNotification, NotificationEvent, NotificationRecord};
use crate::wire::{InboundEvent, OutboundCommand};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Message carried by the synthetic connection-error event.
pub const CONNECTION_ERROR_MESSAGE: &str = "Failed to connect to notification service";

/// Side channel for audible or visual alerts on new notifications.
pub trait AlertHook: Send + Sync {
    fn notification_received(&self, record: &NotificationRecord);
}

impl<F> AlertHook for F
where
    F: Fn(&NotificationRecord) + Send + Sync,
{
    fn notification_received(&self, record: &NotificationRecord) {
        self(record)
    }
}

/// State shared with the connection driver.
struct ClientCore {
    cache: NotificationCache,
    hub: SubscriberHub,
    alert: RwLock<Option<Arc<dyn AlertHook>>>,
    play_sound: bool,
}

impl ClientCore {
    fn on_notification(&self, incoming: IncomingNotification) {
        let id = incoming.id.clone();
        match self.cache.add(incoming) {
            Ok(record) => {
                debug!(id = %record.id, "notification received");
                if self.play_sound {
                    let alert = self.alert.read().clone();
                    if let Some(alert) = alert {
                        alert.notification_received(&record);
                    }
                }
                self.hub.publish(&NotificationEvent::Added { record });
            }
            Err(e) => {
                // The record is in memory; observers should re-read.
                error!(id = %id, error = %e, "failed to persist notification");
                self.hub.publish(&NotificationEvent::Refresh);
            }
        }
    }

    fn on_cleared(&self) {
        if let Err(e) = self.cache.clear() {
            error!(error = %e, "failed to persist cleared history");
        }
        self.hub.publish(&NotificationEvent::Refresh);
    }
}

impl ChannelHandler for ClientCore {
    fn on_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Notification(incoming) => self.on_notification(incoming),
            InboundEvent::NotificationsCleared => self.on_cleared(),
        }
    }

    fn on_connection_failed(&self, error: &ClientError) {
        debug!(error = %error, "broadcasting connection error");
        self.hub.publish(&NotificationEvent::ConnectionError {
            message: CONNECTION_ERROR_MESSAGE.to_string(),
        });
    }
}

/// Persistent real-time notification client.
///
/// # Example
///
/// ```ignore
/// let client = NotificationClient::new(
///     ClientConfig::from_env()?,
///     Arc::new(WsConnector::new()),
///     Arc::new(TokenStore::with_token(token)),
///     Arc::new(FileStore::open(FileStoreConfig::default())?),
/// )?;
///
/// let _subscription = client.subscribe_fn(|event| match event {
///     NotificationEvent::Added { record } => println!("new: {}", record.id),
///     _ => println!("unread: refresh"),
/// });
///
/// client.connect().await?;
/// ```
pub struct NotificationClient {
    core: Arc<ClientCore>,
    connection: ConnectionManager,
}

impl NotificationClient {
    /// Build a client and load the persisted history. Does not connect.
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Self> {
        config.validate()?;

        let core = Arc::new(ClientCore {
            cache: NotificationCache::open(store, config.storage_key.clone(), config.capacity)?,
            hub: SubscriberHub::new(),
            alert: RwLock::new(None),
            play_sound: config.play_sound,
        });
        let connection = ConnectionManager::new(&config, connector, credentials, core.clone())?;

        Ok(Self { core, connection })
    }

    /// Install the alert hook. Only called when `play_sound` is configured.
    pub fn with_alert(self, alert: Arc<dyn AlertHook>) -> Self {
        *self.core.alert.write() = Some(alert);
        self
    }

    /// Connect, or join a connect already in progress.
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    /// Close the channel and drop every subscriber.
    ///
    /// Subscribers must re-subscribe after a manual disconnect. The cached
    /// history is kept.
    pub fn disconnect(&self) {
        self.connection.disconnect();
        self.core.hub.clear();
    }

    /// Mark one notification as read.
    ///
    /// Subscribers are notified even when `id` is unknown.
    pub fn mark_as_read(&self, id: &str) -> Result<()> {
        let result = self.core.cache.mark_read(id).map(|_| ());
        self.after_local_change(OutboundCommand::MarkAsRead {
            notification_id: id.to_string(),
        });
        result
    }

    pub fn mark_all_as_read(&self) -> Result<()> {
        let result = self.core.cache.mark_all_read().map(|_| ());
        self.after_local_change(OutboundCommand::MarkAllAsRead);
        result
    }

    /// Empty the local history and ask the source to do the same.
    pub fn clear_notifications(&self) -> Result<()> {
        let result = self.core.cache.clear();
        self.after_local_change(OutboundCommand::ClearNotifications);
        result
    }

    fn after_local_change(&self, command: OutboundCommand) {
        self.core.hub.publish(&NotificationEvent::Refresh);

        if !self.connection.is_connected() {
            debug!(command = command.name(), "not connected, command kept local");
            return;
        }
        let name = command.name();
        if let Err(e) = self.connection.send(command) {
            warn!(command = name, error = %e, "failed to send command");
        }
    }

    /// Snapshot of the history, newest first.
    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.core.cache.snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.core.cache.unread_count()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Subscription {
        self.core.hub.subscribe(subscriber)
    }

    pub fn subscribe_fn<F>(&self, f: F) -> Subscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.core.hub.subscribe_fn(f)
    }

    /// Receive events through a bounded channel. A consumer that falls
    /// `buffer_size` events behind is dropped.
    pub fn subscribe_channel(&self, buffer_size: usize) -> ChannelSubscription {
        self.core.hub.subscribe_channel(buffer_size)
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.core.hub.len()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }
}
