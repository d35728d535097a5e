//! Cross-node scenarios for the data-structures manager.
//!
//! Two manager instances share one embedded cache, which behaves like a
//! replicated cache: every node's commit hook observes every committed
//! transaction and both nodes consume the same change feed. This mirrors a
//! two-node cluster closely enough to exercise the cross-node propagation
//! paths without network plumbing.

use std::sync::Arc;
use std::time::Duration;

use trellis::cache::{CacheConfig, MemoryCache, SharedCache};
use trellis::{DataStructuresManager, StructuresError};

fn two_nodes() -> (SharedCache, Arc<DataStructuresManager>, Arc<DataStructuresManager>) {
    two_nodes_with(CacheConfig::default())
}

fn two_nodes_with(
    config: CacheConfig,
) -> (SharedCache, Arc<DataStructuresManager>, Arc<DataStructuresManager>) {
    let cache: SharedCache = MemoryCache::with_config("cluster", config);

    let node_a = DataStructuresManager::new(cache.clone());
    node_a.start();

    let node_b = DataStructuresManager::new(cache.clone());
    node_b.start();

    (cache, node_a, node_b)
}

async fn wait_until(mut probe: impl FnMut() -> bool) {
    for _ in 0..200 {
        if probe() {
            return;
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("condition not reached in time");
}

#[tokio::test]
async fn sequence_ranges_are_disjoint_across_nodes() {
    let (_, node_a, node_b) = two_nodes_with(CacheConfig {
        sequence_reserve_size: 10,
        ..CacheConfig::default()
    });

    let seq_a = node_a.sequence("ids", 100, true).await.unwrap().unwrap();
    let seq_b = node_b.sequence("ids", 0, true).await.unwrap().unwrap();

    // Node A seeded [100, 109]; node B adopted the existing sequence and
    // reserved the following range, its init value ignored.
    let mut seen = std::collections::HashSet::new();

    for _ in 0..25 {
        assert!(seen.insert(seq_a.next().await.unwrap()));
        assert!(seen.insert(seq_b.next().await.unwrap()));
    }

    assert_eq!(seen.len(), 50);
    assert!(seen.contains(&100));
    assert!(seen.contains(&110), "node B starts past node A's range");
}

#[tokio::test]
async fn seeded_sequence_matches_reservation_layout() {
    let (_, node_a, _) = two_nodes_with(CacheConfig {
        sequence_reserve_size: 10,
        ..CacheConfig::default()
    });

    let seq = node_a.sequence("s", 100, true).await.unwrap().unwrap();

    for expected in 100..110 {
        assert_eq!(seq.next().await.unwrap(), expected);
    }

    // The eleventh call crosses into a freshly reserved range.
    assert_eq!(seq.next().await.unwrap(), 110);
    assert_eq!(seq.current().await.unwrap(), 111);
}

#[tokio::test]
async fn latch_auto_delete_propagates_to_all_nodes() {
    let (_, node_a, node_b) = two_nodes();

    let latch_a = node_a
        .count_down_latch("gate", 2, true, true)
        .await
        .unwrap()
        .unwrap();

    // Node B joins the existing latch; its parameters are ignored.
    let latch_b = node_b
        .count_down_latch("gate", 0, false, false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(latch_b.count(), 2);

    let waiter = {
        let latch_b = latch_b.clone();
        tokio::spawn(async move { latch_b.wait_for_zero().await })
    };

    assert_eq!(latch_a.count_down().await.unwrap(), 1);
    assert_eq!(latch_b.count(), 1);

    assert_eq!(latch_a.count_down().await.unwrap(), 0);

    // Both nodes observed zero; the waiter on B wakes up.
    waiter.await.unwrap().unwrap();
    assert_eq!(latch_b.count(), 0);

    // Auto-delete removed the entry cluster-wide.
    assert!(node_a
        .count_down_latch("gate", 0, false, false)
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        latch_b.count_down().await,
        Err(StructuresError::Removed { .. })
    ));
    assert_eq!(node_a.memory_stats().structures, 0);
    assert_eq!(node_b.memory_stats().structures, 0);
}

#[tokio::test]
async fn atomic_long_is_shared_between_nodes() {
    let (_, node_a, node_b) = two_nodes();

    let a = node_a.atomic_long("hits", 5, true).await.unwrap().unwrap();
    let b = node_b.atomic_long("hits", 99, true).await.unwrap().unwrap();

    assert_eq!(b.get().await.unwrap(), 5);
    assert_eq!(a.increment_and_get().await.unwrap(), 6);
    assert_eq!(b.add_and_get(4).await.unwrap(), 10);
    assert_eq!(a.get().await.unwrap(), 10);

    assert!(b.compare_and_set(10, 0).await.unwrap());
    assert_eq!(a.get().await.unwrap(), 0);
}

#[tokio::test]
async fn reference_roundtrip_survives_node_boundary() {
    let (_, node_a, node_b) = two_nodes();

    let ref_a = node_a
        .atomic_reference::<String>("cfg", &"v1".to_string(), true)
        .await
        .unwrap()
        .unwrap();

    let ref_b = node_b
        .atomic_reference::<String>("cfg", &"ignored".to_string(), true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ref_b.get().await.unwrap(), "v1");

    ref_a.set(&"v2".to_string()).await.unwrap();
    assert_eq!(ref_b.get().await.unwrap(), "v2");

    assert!(ref_b
        .compare_and_set(&"v2".to_string(), &"v3".to_string())
        .await
        .unwrap());
    assert_eq!(ref_a.get().await.unwrap(), "v3");
}

#[tokio::test]
async fn type_conflicts_surface_across_nodes() {
    let (_, node_a, node_b) = two_nodes();

    node_a.atomic_long("x", 0, true).await.unwrap();

    // Node B has no local proxy; the conflict is detected against the
    // stored entry inside the transaction.
    assert!(matches!(
        node_b.sequence("x", 0, true).await,
        Err(StructuresError::TypeMismatch { .. })
    ));
    assert!(matches!(
        node_b.remove_count_down_latch("x").await,
        Err(StructuresError::TypeMismatch { .. })
    ));

    // Nothing changed: the long is still there for node B.
    let along = node_b.atomic_long("x", 0, false).await.unwrap().unwrap();
    assert_eq!(along.get().await.unwrap(), 0);
}

#[tokio::test]
async fn queue_elements_flow_between_nodes() {
    let (_, node_a, node_b) = two_nodes();

    let qa = node_a
        .queue::<String>("jobs", 0, true, true)
        .await
        .unwrap()
        .unwrap();
    let qb = node_b
        .queue::<String>("jobs", 0, true, false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(qa.id(), qb.id());

    qa.offer(&"one".to_string()).await.unwrap();
    qa.offer(&"two".to_string()).await.unwrap();

    assert_eq!(qb.size().await.unwrap(), 2);
    assert_eq!(qb.poll().await.unwrap().as_deref(), Some("one"));
    assert_eq!(qa.poll().await.unwrap().as_deref(), Some("two"));
    assert_eq!(qb.poll().await.unwrap(), None);
}

#[tokio::test]
async fn queue_conflict_and_adoption() {
    let (_, node_a, node_b) = two_nodes();

    let qa = node_a
        .queue::<i32>("q", 16, true, true)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        node_b.queue::<i32>("q", 32, true, true).await,
        Err(StructuresError::QueueConflict { capacity: 16, .. })
    ));

    let qc = node_b
        .queue::<i32>("q", 16, true, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(qc.id(), qa.id());
}

#[tokio::test]
async fn queue_removal_propagates_to_remote_proxies() {
    let (_, node_a, node_b) = two_nodes();

    let qa = node_a
        .queue::<i32>("jobs", 0, true, true)
        .await
        .unwrap()
        .unwrap();
    let qb = node_b
        .queue::<i32>("jobs", 0, true, false)
        .await
        .unwrap()
        .unwrap();

    qa.offer(&1).await.unwrap();
    qa.offer(&2).await.unwrap();

    assert!(node_a.remove_queue("jobs", 50).await.unwrap());

    // Node B's header watcher probes the vanished header and drops the
    // proxy from its by-id registry.
    wait_until(|| node_b.memory_stats().queues == 0).await;

    assert!(matches!(
        qb.size().await,
        Err(StructuresError::QueueRemoved { .. })
    ));
    assert!(matches!(
        qa.offer(&3).await,
        Err(StructuresError::QueueRemoved { .. })
    ));
}

#[tokio::test]
async fn recreated_queue_is_a_fresh_incarnation() {
    let (_, node_a, node_b) = two_nodes();

    let first = node_a
        .queue::<i32>("q", 0, true, true)
        .await
        .unwrap()
        .unwrap();
    first.offer(&1).await.unwrap();

    assert!(node_a.remove_queue("q", 10).await.unwrap());

    let second = node_b
        .queue::<i32>("q", 0, true, true)
        .await
        .unwrap()
        .unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(second.size().await.unwrap(), 0);

    second.offer(&2).await.unwrap();
    assert_eq!(second.poll().await.unwrap(), Some(2));
}

#[tokio::test]
async fn shutdown_fences_feed_callbacks() {
    let (_, node_a, node_b) = two_nodes();

    let latch_a = node_a
        .count_down_latch("gate", 1, false, true)
        .await
        .unwrap()
        .unwrap();
    let latch_b = node_b
        .count_down_latch("gate", 0, false, false)
        .await
        .unwrap()
        .unwrap();

    node_a.stop().await;

    // Node B still drives the latch to zero...
    assert_eq!(latch_b.count_down().await.unwrap(), 0);
    assert_eq!(latch_b.count(), 0);

    // ...but node A's fenced hook performed no observable work.
    assert_eq!(latch_a.count(), 1);
    assert_eq!(node_a.memory_stats().structures, 1);

    // And node A accepts no new work.
    assert!(matches!(
        node_a.atomic_long("x", 0, true).await,
        Err(StructuresError::NodeStopping)
    ));
}

#[tokio::test]
async fn removal_on_one_node_invalidates_remote_proxy() {
    let (_, node_a, node_b) = two_nodes();

    let long_a = node_a.atomic_long("n", 7, true).await.unwrap().unwrap();
    let long_b = node_b.atomic_long("n", 0, true).await.unwrap().unwrap();

    assert!(node_b.remove_atomic_long("n").await.unwrap());

    // The delete commit reached both registries synchronously.
    assert!(matches!(
        long_a.get().await,
        Err(StructuresError::Removed { .. })
    ));
    assert!(matches!(
        long_b.increment_and_get().await,
        Err(StructuresError::Removed { .. })
    ));
    assert_eq!(node_a.memory_stats().structures, 0);
}
