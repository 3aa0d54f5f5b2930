//! # Herald
//!
//! A persistent real-time notification client. It keeps an authenticated
//! duplex channel to a notification source, buffers incoming notifications
//! into a bounded newest-first history that survives restarts, tracks
//! read/unread state, and fans changes out to observers.
//!
//! ## Core Concepts
//!
//! - **Connection**: single-flight connect, linear-backoff retry, terminal failure
//! - **Cache**: bounded history persisted on every mutation
//! - **Hub**: identity-keyed subscribers with isolated delivery
//! - **Store**: durable key/value list storage behind [`PersistentStore`]
//!
//! ## Example
//!
//! ```ignore
//! use herald::{ClientConfig, FileStore, FileStoreConfig, NotificationClient, TokenStore, WsConnector};
//!
//! let client = NotificationClient::new(
//!     ClientConfig::production("wss://notify.example.com/ws"),
//!     Arc::new(WsConnector::new()),
//!     Arc::new(TokenStore::with_token(token)),
//!     Arc::new(FileStore::open(FileStoreConfig::default())?),
//! )?;
//!
//! let _subscription = client.subscribe_fn(|event| println!("{:?}", event));
//! client.connect().await?;
//!
//! client.mark_all_as_read()?;
//! assert_eq!(client.unread_count(), 0);
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod hub;
pub mod store;
pub mod transport;
pub mod types;
pub mod wire;

// Re-exports
pub use cache::NotificationCache;
pub use client::{AlertHook, NotificationClient, CONNECTION_ERROR_MESSAGE};
pub use config::{ClientConfig, DEFAULT_STORAGE_KEY};
pub use connection::{ChannelHandler, ConnectionManager};
pub use credentials::{CredentialProvider, EnvCredentials, TokenStore};
pub use error::{ClientError, Result, StorageError, TransportError};
pub use hub::{ChannelSubscription, FnSubscriber, Subscriber, SubscriberHub, SubscriberId, Subscription};
pub use store::{FileStore, FileStoreConfig, MemoryStore, PersistentStore, StoreEncoding};
pub use transport::{Channel, ConnectRequest, Connector, Gate, MemoryConnector, ServerSession, WsConnector};
pub use types::{
    ConnectionState, IncomingNotification, NotificationEvent, NotificationRecord, DEFAULT_CAPACITY,
};
pub use wire::{InboundEvent, OutboundCommand};
