//! Scaling tests for Herald with sustained notification traffic.
//!
//! Measures key operations under load:
//! - History churn through a bounded cache on disk
//! - Reopening a full history
//! - Fan-out to many subscribers
//! - Read-state operations on a full cache

use herald::{
    FileStore, FileStoreConfig, IncomingNotification, MemoryStore, NotificationCache,
    NotificationEvent, StoreEncoding, SubscriberHub,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

const NOTIFICATION_COUNT: usize = 2_000;

fn test_config(dir: &TempDir, encoding: StoreEncoding) -> FileStoreConfig {
    FileStoreConfig {
        path: dir.path().to_path_buf(),
        encoding,
        create_if_missing: true,
    }
}

fn notification(i: usize) -> IncomingNotification {
    IncomingNotification::new(
        format!("n{}", i),
        json!({"title": format!("Event {}", i), "kind": "build", "seq": i}),
    )
}

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn report(&self) {
        println!("  {} took {:.2}ms", self.name, self.elapsed_ms());
    }

    fn report_with_count(&self, count: usize) {
        let ms = self.elapsed_ms();
        println!(
            "  {} took {:.2}ms ({} items, {:.0} items/sec)",
            self.name,
            ms,
            count,
            if ms > 0.0 { count as f64 / (ms / 1000.0) } else { 0.0 }
        );
    }
}

// =============================================================================
// Test: sustained churn through a bounded history on disk
// =============================================================================

fn churn(encoding: StoreEncoding) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::open(test_config(&dir, encoding)).unwrap());
    let cache = NotificationCache::open(store, "notifications", 50).unwrap();

    let timer = Timer::new("Add notifications");
    for i in 0..NOTIFICATION_COUNT {
        cache.add(notification(i)).unwrap();
    }
    timer.report_with_count(NOTIFICATION_COUNT);

    assert_eq!(cache.len(), 50);
    assert_eq!(cache.unread_count(), 50);
    let newest = cache.snapshot();
    assert_eq!(newest[0].id, format!("n{}", NOTIFICATION_COUNT - 1));
    assert_eq!(newest[49].id, format!("n{}", NOTIFICATION_COUNT - 50));
    drop(cache);

    let timer = Timer::new("Reopen history");
    let store = Arc::new(FileStore::open(test_config(&dir, encoding)).unwrap());
    let cache = NotificationCache::open(store, "notifications", 50).unwrap();
    timer.report();

    assert_eq!(cache.snapshot(), newest);
}

#[test]
fn test_scaling_churn_json() {
    println!("\n=== {} notifications, JSON history ===", NOTIFICATION_COUNT);
    churn(StoreEncoding::Json);
}

#[test]
fn test_scaling_churn_messagepack() {
    println!("\n=== {} notifications, MessagePack history ===", NOTIFICATION_COUNT);
    churn(StoreEncoding::MessagePack);
}

// =============================================================================
// Test: large capacity with read-state operations
// =============================================================================

#[test]
fn test_scaling_large_capacity_read_state() {
    println!("\n=== Large capacity read-state ===");

    let store = Arc::new(MemoryStore::new());
    let cache = NotificationCache::open(store.clone(), "notifications", 1_000).unwrap();

    let timer = Timer::new("Fill cache");
    for i in 0..1_000 {
        cache.add(notification(i)).unwrap();
    }
    timer.report_with_count(1_000);

    let timer = Timer::new("Mark every other read");
    for i in (0..1_000).step_by(2) {
        assert!(cache.mark_read(&format!("n{}", i)).unwrap());
    }
    timer.report_with_count(500);
    assert_eq!(cache.unread_count(), 500);

    let timer = Timer::new("Mark all read");
    assert_eq!(cache.mark_all_read().unwrap(), 500);
    timer.report();
    assert_eq!(cache.unread_count(), 0);

    // One write per mutation.
    assert_eq!(store.write_count(), 1_000 + 500 + 1);
}

// =============================================================================
// Test: fan-out to many subscribers
// =============================================================================

#[test]
fn test_scaling_fan_out() {
    println!("\n=== Fan-out to 500 subscribers ===");

    let hub = SubscriberHub::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    let subscriptions: Vec<_> = (0..500)
        .map(|_| {
            let delivered = delivered.clone();
            hub.subscribe_fn(move |_| {
                delivered.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();
    assert_eq!(hub.len(), 500);

    let timer = Timer::new("Publish 200 events");
    for _ in 0..200 {
        hub.publish(&NotificationEvent::Refresh);
    }
    timer.report_with_count(200 * 500);
    assert_eq!(delivered.load(Ordering::Relaxed), 200 * 500);

    for subscription in subscriptions.iter().take(250) {
        assert!(subscription.unsubscribe());
    }
    hub.publish(&NotificationEvent::Refresh);
    assert_eq!(delivered.load(Ordering::Relaxed), 200 * 500 + 250);
}

#[test]
fn test_scaling_slow_channel_subscribers_dropped() {
    println!("\n=== Slow channel subscribers ===");

    let hub = SubscriberHub::new();
    let slow: Vec<_> = (0..50).map(|_| hub.subscribe_channel(4)).collect();
    let fast = hub.subscribe_channel(1_000);

    for _ in 0..100 {
        hub.publish(&NotificationEvent::Refresh);
    }

    // Every slow subscriber overflowed and was removed.
    assert_eq!(hub.len(), 1);
    assert!(slow.iter().all(|s| s.try_recv().is_ok()));
    assert_eq!(fast.receiver.len(), 100);
}
