//! Durable storage for the notification history.
//!
//! The cache writes its whole bounded list under a single key after every
//! mutation, so implementations only need get/set of a record list:
//!
//! - [`MemoryStore`]: process-local map, for tests and ephemeral clients
//! - [`FileStore`]: one checksummed file per key in a locked directory

mod file;
mod memory;

pub use file::{FileStore, FileStoreConfig, StoreEncoding};
pub use memory::MemoryStore;

use crate::error::StorageError;
use crate::types::NotificationRecord;

/// Key-value durable storage of record lists.
pub trait PersistentStore: Send + Sync {
    /// Load the list stored under `key`. `Ok(None)` if nothing was stored.
    fn get(&self, key: &str) -> Result<Option<Vec<NotificationRecord>>, StorageError>;

    /// Replace the list stored under `key`. Must be durable when it returns.
    fn set(&self, key: &str, records: &[NotificationRecord]) -> Result<(), StorageError>;
}
