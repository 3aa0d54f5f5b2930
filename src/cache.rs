//! Bounded notification history with read-state.
//!
//! The cache is the only writer of the durable store. Every mutation is
//! applied in memory and then written through under the same lock, so the
//! store reflects a mutation before the call returns. If the write fails the
//! in-memory change stays applied and the error is returned.

use crate::error::{Result, StorageError};
use crate::store::PersistentStore;
use crate::types::{now_iso8601, IncomingNotification, NotificationRecord};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Bounded, newest-first collection of notifications.
pub struct NotificationCache {
    store: Arc<dyn PersistentStore>,
    key: String,
    capacity: usize,
    records: Mutex<VecDeque<NotificationRecord>>,
}

impl NotificationCache {
    /// Open the cache, loading whatever the store holds under `key`.
    ///
    /// A stored list longer than `capacity` is truncated to its newest entries.
    pub fn open(
        store: Arc<dyn PersistentStore>,
        key: impl Into<String>,
        capacity: usize,
    ) -> Result<Self> {
        let key = key.into();
        let capacity = capacity.max(1);

        let mut records: VecDeque<NotificationRecord> =
            store.get(&key)?.unwrap_or_default().into();
        if records.len() > capacity {
            warn!(
                stored = records.len(),
                capacity, "stored history exceeds capacity, truncating"
            );
            records.truncate(capacity);
        }
        debug!(key = %key, loaded = records.len(), "opened notification cache");

        Ok(Self {
            store,
            key,
            capacity,
            records: Mutex::new(records),
        })
    }

    /// Maximum number of records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a notification at the front, evicting the oldest beyond capacity.
    pub fn add(&self, incoming: IncomingNotification) -> Result<NotificationRecord> {
        let record = incoming.into_record(now_iso8601());

        let mut records = self.records.lock();
        records.push_front(record.clone());
        records.truncate(self.capacity);
        self.persist(&mut records)?;

        Ok(record)
    }

    /// Mark every record with `id` as read.
    ///
    /// Unknown ids are not an error: nothing transitions but the list is
    /// still written. Returns whether any record changed.
    pub fn mark_read(&self, id: &str) -> Result<bool> {
        let mut records = self.records.lock();
        let mut changed = false;
        for record in records.iter_mut().filter(|r| r.id == id) {
            if !record.read {
                record.read = true;
                changed = true;
            }
        }
        self.persist(&mut records)?;

        Ok(changed)
    }

    /// Mark every record as read. Returns how many changed.
    pub fn mark_all_read(&self) -> Result<usize> {
        let mut records = self.records.lock();
        let mut changed = 0;
        for record in records.iter_mut().filter(|r| !r.read) {
            record.read = true;
            changed += 1;
        }
        self.persist(&mut records)?;

        Ok(changed)
    }

    /// Drop every record.
    pub fn clear(&self) -> Result<()> {
        let mut records = self.records.lock();
        records.clear();
        self.persist(&mut records)
    }

    /// Number of records not yet read.
    pub fn unread_count(&self) -> usize {
        self.records.lock().iter().filter(|r| !r.read).count()
    }

    /// Point-in-time copy of the history, newest first.
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Look up the newest record with `id`.
    pub fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn persist(&self, records: &mut VecDeque<NotificationRecord>) -> Result<()> {
        self.store
            .set(&self.key, records.make_contiguous())
            .map_err(|e: StorageError| {
                error!(key = %self.key, error = %e, "failed to persist notifications");
                e.into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn open_cache(store: &Arc<MemoryStore>, capacity: usize) -> NotificationCache {
        NotificationCache::open(store.clone(), "notifications", capacity).unwrap()
    }

    fn incoming(id: &str) -> IncomingNotification {
        IncomingNotification::new(id, json!({"msg": id}))
    }

    #[test]
    fn test_add_prepends_and_stamps() {
        let store = Arc::new(MemoryStore::new());
        let cache = open_cache(&store, 50);

        cache.add(incoming("a")).unwrap();
        let b = cache.add(incoming("b")).unwrap();

        assert!(!b.timestamp.is_empty());
        let ids: Vec<_> = cache.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(store.get("notifications").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_evicts_oldest() {
        let store = Arc::new(MemoryStore::new());
        let cache = open_cache(&store, 3);

        for id in ["a", "b", "c", "d", "e"] {
            cache.add(incoming(id)).unwrap();
        }

        let ids: Vec<_> = cache.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["e", "d", "c"]);
    }

    #[test]
    fn test_insertion_order_not_timestamp_order() {
        let store = Arc::new(MemoryStore::new());
        let cache = open_cache(&store, 50);

        cache
            .add(incoming("new").with_timestamp("2030-01-01T00:00:00.000Z"))
            .unwrap();
        cache
            .add(incoming("old").with_timestamp("2000-01-01T00:00:00.000Z"))
            .unwrap();

        assert_eq!(cache.snapshot()[0].id, "old");
    }

    #[test]
    fn test_mark_read_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let cache = open_cache(&store, 50);
        cache.add(incoming("a")).unwrap();
        cache.add(incoming("b")).unwrap();

        assert!(cache.mark_read("a").unwrap());
        let once = cache.snapshot();
        assert!(!cache.mark_read("a").unwrap());

        assert_eq!(cache.snapshot(), once);
        assert_eq!(cache.unread_count(), 1);
    }

    #[test]
    fn test_mark_read_unknown_still_persists() {
        let store = Arc::new(MemoryStore::new());
        let cache = open_cache(&store, 50);
        cache.add(incoming("a")).unwrap();
        let before = cache.snapshot();
        let writes = store.write_count();

        assert!(!cache.mark_read("missing").unwrap());

        assert_eq!(cache.snapshot(), before);
        assert_eq!(store.write_count(), writes + 1);
    }

    #[test]
    fn test_mark_all_and_clear() {
        let store = Arc::new(MemoryStore::new());
        let cache = open_cache(&store, 50);
        for id in ["a", "b", "c"] {
            cache.add(incoming(id)).unwrap();
        }

        assert_eq!(cache.mark_all_read().unwrap(), 3);
        assert_eq!(cache.unread_count(), 0);

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(store.get("notifications").unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_restores_history() {
        let store = Arc::new(MemoryStore::new());
        {
            let cache = open_cache(&store, 50);
            cache.add(incoming("a")).unwrap();
            cache.mark_read("a").unwrap();
        }

        let cache = open_cache(&store, 50);
        let restored = cache.get("a").unwrap();
        assert!(restored.read);
        assert_eq!(restored.payload, json!({"msg": "a"}));
    }

    #[test]
    fn test_reopen_truncates_to_capacity() {
        let store = Arc::new(MemoryStore::new());
        {
            let cache = open_cache(&store, 10);
            for i in 0..10 {
                cache.add(incoming(&i.to_string())).unwrap();
            }
        }

        let cache = open_cache(&store, 4);
        let ids: Vec<_> = cache.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["9", "8", "7", "6"]);
    }

    #[test]
    fn test_storage_failure_keeps_memory() {
        let store = Arc::new(MemoryStore::new());
        let cache = open_cache(&store, 50);
        store.set_fail_writes(true);

        let result = cache.add(incoming("a"));
        assert!(matches!(result, Err(ClientError::Storage(_))));
        assert_eq!(cache.len(), 1);
        assert!(store.get("notifications").unwrap().is_none());
    }
}
