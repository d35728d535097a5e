//! Monotonic sequence generator with local range reservation.
//!
//! Each node privately reserves a contiguous span of ids under a pessimistic
//! transaction and then serves `next()` from the span without touching the
//! cluster. Ids are globally unique; per node they are strictly increasing.
//! A crashed node forfeits at most one unexhausted span.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{CacheTx, ClusterCache, SharedCache, TxConcurrency, TxIsolation};
use crate::structures::error::{RemovedSnafu, SequenceOverflowSnafu, StructuresError};
use crate::structures::keys::StructureKey;
use crate::structures::values::{KindView, SequenceValue};

/// Locally reserved `[local, up_bound]` span.
#[derive(Debug, Clone, Copy)]
struct Range {
    /// Next id to hand out.
    local: i64,
    /// Last id of the reservation, inclusive.
    up_bound: i64,
}

/// Local proxy of a named sequence.
pub struct AtomicSequence {
    name: String,
    key: StructureKey,
    cache: SharedCache,
    view: KindView<SequenceValue>,
    reserve_size: i64,
    range: Mutex<Range>,
    removed: AtomicBool,
}

impl AtomicSequence {
    pub(crate) fn new(
        name: impl Into<String>,
        cache: SharedCache,
        reserve_size: i64,
        local: i64,
        up_bound: i64,
    ) -> Self {
        let name = name.into();

        Self {
            key: StructureKey::new(name.clone()),
            view: KindView::new(cache.clone()),
            cache,
            reserve_size,
            range: Mutex::new(Range { local, up_bound }),
            removed: AtomicBool::new(false),
            name,
        }
    }

    /// The user-visible sequence name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The next id `next()` would return, from the local span. Does not
    /// touch the cluster.
    pub async fn current(&self) -> Result<i64, StructuresError> {
        self.ensure_active()?;

        Ok(self.range.lock().await.local)
    }

    /// Return the next id, reserving a fresh span from the cluster when the
    /// local one is exhausted.
    pub async fn next(&self) -> Result<i64, StructuresError> {
        self.ensure_active()?;

        let mut range = self.range.lock().await;

        if range.local <= range.up_bound {
            let id = range.local;
            range.local += 1;

            return Ok(id);
        }

        let fresh = self.reserve().await?;
        *range = Range {
            local: fresh.local + 1,
            up_bound: fresh.up_bound,
        };

        Ok(fresh.local)
    }

    /// Reserve the next `[G, G + reserve - 1]` span under a pessimistic
    /// transaction and advance the global counter past it.
    async fn reserve(&self) -> Result<Range, StructuresError> {
        let mut tx = self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?;

        let stored = self.view.get_in(tx.as_mut(), &self.key).await?;

        let Some(seq) = stored else {
            self.removed.store(true, Ordering::Release);

            return RemovedSnafu { name: &self.name }.fail();
        };

        let (up_bound, next_global) = reserved_bounds(seq.next, self.reserve_size)
            .ok_or_else(|| SequenceOverflowSnafu { name: &self.name }.build())?;

        self.view
            .put_in(tx.as_mut(), &self.key, SequenceValue { next: next_global })
            .await?;

        tx.commit().await?;

        debug!(
            name = %self.name,
            range_start = seq.next,
            range_end = up_bound,
            "reserved sequence range"
        );

        Ok(Range {
            local: seq.next,
            up_bound,
        })
    }

    pub(crate) fn on_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    fn ensure_active(&self) -> Result<(), StructuresError> {
        if self.removed.load(Ordering::Acquire) {
            return RemovedSnafu { name: &self.name }.fail();
        }

        Ok(())
    }
}

/// Bounds of a reservation starting at `start`: the inclusive upper bound
/// and the next unreserved global id. `None` when the span would run past
/// the end of the id range; reservation never wraps.
pub(crate) fn reserved_bounds(start: i64, reserve_size: i64) -> Option<(i64, i64)> {
    let span = reserve_size.max(1) - 1;
    let up_bound = start.checked_add(span)?;
    let next_global = up_bound.checked_add(1)?;

    Some((up_bound, next_global))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::cache::{ClusterCache, MemoryCache};
    use crate::structures::values::{StructureRecord, StructureValue};

    async fn seed(cache: &Arc<MemoryCache>, name: &str, next: i64) {
        let key = StructureKey::new(name).cache_key();
        let raw = serde_json::to_string(&SequenceValue { next }.wrap()).unwrap();
        cache.put(&key, &raw).await.unwrap();
    }

    async fn stored_next(cache: &Arc<MemoryCache>, name: &str) -> i64 {
        let key = StructureKey::new(name).cache_key();
        let raw = cache.get(&key).await.unwrap().unwrap();

        match serde_json::from_str::<StructureValue>(&raw).unwrap() {
            StructureValue::Sequence(v) => v.next,
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn reserved_bounds_basic() {
        assert_eq!(reserved_bounds(100, 10), Some((109, 110)));
        assert_eq!(reserved_bounds(100, 1), Some((100, 101)));
        assert_eq!(reserved_bounds(100, 0), Some((100, 101)));
    }

    #[test]
    fn reserved_bounds_signals_overflow() {
        assert_eq!(reserved_bounds(i64::MAX, 1), None);
        assert_eq!(reserved_bounds(i64::MAX - 5, 10), None);
    }

    #[tokio::test]
    async fn next_serves_local_range_then_reserves() {
        let cache = MemoryCache::new("seq");
        // Manager seeded range [100, 109] and persisted next=110.
        seed(&cache, "s", 110).await;

        let seq = AtomicSequence::new("s", cache.clone(), 10, 100, 109);

        for expected in 100..110 {
            assert_eq!(seq.next().await.unwrap(), expected);
        }

        // Eleventh call crosses the range boundary.
        assert_eq!(seq.next().await.unwrap(), 110);
        assert_eq!(stored_next(&cache, "s").await, 120);
        assert_eq!(seq.next().await.unwrap(), 111);
    }

    #[tokio::test]
    async fn ids_unique_across_proxies() {
        let cache = MemoryCache::new("seq");
        seed(&cache, "s", 0).await;

        let a = Arc::new(AtomicSequence::new("s", cache.clone(), 5, 0, -1));
        let b = Arc::new(AtomicSequence::new("s", cache.clone(), 5, 0, -1));

        let mut seen = HashSet::new();

        for _ in 0..20 {
            assert!(seen.insert(a.next().await.unwrap()));
            assert!(seen.insert(b.next().await.unwrap()));
        }

        assert_eq!(seen.len(), 40);
    }

    #[tokio::test]
    async fn per_proxy_ids_strictly_increase() {
        let cache = MemoryCache::new("seq");
        seed(&cache, "s", 0).await;

        let other = AtomicSequence::new("s", cache.clone(), 3, 0, -1);
        let seq = AtomicSequence::new("s", cache.clone(), 3, 0, -1);

        let mut prev = i64::MIN;

        for i in 0..30 {
            let id = seq.next().await.unwrap();
            assert!(id > prev, "{id} must be greater than {prev}");
            prev = id;

            // Interleave a competitor so ranges do not stay adjacent.
            if i % 3 == 0 {
                other.next().await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn reservation_after_removal_fails() {
        let cache = MemoryCache::new("seq");
        seed(&cache, "s", 10).await;

        let seq = AtomicSequence::new("s", cache.clone(), 2, 10, 9);

        cache
            .remove(&StructureKey::new("s").cache_key())
            .await
            .unwrap();

        assert!(matches!(
            seq.next().await,
            Err(StructuresError::Removed { .. })
        ));

        // The proxy stays rejected afterwards.
        assert!(matches!(
            seq.current().await,
            Err(StructuresError::Removed { .. })
        ));
    }

    #[tokio::test]
    async fn overflow_is_signalled_not_wrapped() {
        let cache = MemoryCache::new("seq");
        seed(&cache, "s", i64::MAX - 2).await;

        let seq = AtomicSequence::new("s", cache.clone(), 10, 0, -1);

        assert!(matches!(
            seq.next().await,
            Err(StructuresError::SequenceOverflow { .. })
        ));
    }
}
