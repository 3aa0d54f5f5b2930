//! Property tests for the bounded history.

use herald::{IncomingNotification, MemoryStore, NotificationCache, PersistentStore};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Add(u8),
    MarkRead(u8),
    MarkAllRead,
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => any::<u8>().prop_map(|id| Op::Add(id % 32)),
        3 => any::<u8>().prop_map(|id| Op::MarkRead(id % 32)),
        1 => Just(Op::MarkAllRead),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn history_matches_reference_model(
        capacity in 1usize..12,
        ops in prop::collection::vec(op(), 0..80),
    ) {
        let store = Arc::new(MemoryStore::new());
        let cache = NotificationCache::open(store.clone(), "notifications", capacity).unwrap();
        // (id, read), newest first
        let mut model: Vec<(String, bool)> = Vec::new();

        for op in &ops {
            match op {
                Op::Add(id) => {
                    let id = format!("n{}", id);
                    cache.add(IncomingNotification::new(id.clone(), json!({}))).unwrap();
                    model.insert(0, (id, false));
                    model.truncate(capacity);
                }
                Op::MarkRead(id) => {
                    let id = format!("n{}", id);
                    cache.mark_read(&id).unwrap();
                    for entry in model.iter_mut().filter(|(i, _)| *i == id) {
                        entry.1 = true;
                    }
                }
                Op::MarkAllRead => {
                    cache.mark_all_read().unwrap();
                    for entry in model.iter_mut() {
                        entry.1 = true;
                    }
                }
                Op::Clear => {
                    cache.clear().unwrap();
                    model.clear();
                }
            }

            prop_assert!(cache.len() <= capacity);
        }

        let snapshot: Vec<(String, bool)> = cache
            .snapshot()
            .into_iter()
            .map(|r| (r.id, r.read))
            .collect();
        prop_assert_eq!(&snapshot, &model);
        prop_assert_eq!(cache.unread_count(), model.iter().filter(|(_, read)| !read).count());

        // The store mirrors memory after every mutation.
        let stored: Vec<(String, bool)> = store
            .get("notifications")
            .unwrap()
            .unwrap_or_default()
            .into_iter()
            .map(|r| (r.id, r.read))
            .collect();
        prop_assert_eq!(stored, model);
        prop_assert_eq!(store.write_count(), ops.len() as u64);
    }

    #[test]
    fn reopen_truncates_to_newest(stored in 0usize..40, capacity in 1usize..20) {
        let store = Arc::new(MemoryStore::new());
        {
            let wide = NotificationCache::open(store.clone(), "notifications", 64).unwrap();
            for i in 0..stored {
                wide.add(IncomingNotification::new(format!("n{}", i), json!({}))).unwrap();
            }
        }

        let cache = NotificationCache::open(store, "notifications", capacity).unwrap();

        prop_assert_eq!(cache.len(), stored.min(capacity));
        if stored > 0 {
            let snapshot = cache.snapshot();
            let newest = format!("n{}", stored - 1);
            prop_assert_eq!(snapshot[0].id.as_str(), newest.as_str());
        }
    }
}
