//! Count-down latch proxy.
//!
//! The cluster count lives in the backing record; each proxy mirrors it in
//! a local watch channel fed by the manager's commit hook, so waiters wake
//! without polling the cache. Counting down is a single-entry pessimistic
//! transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::cache::{CacheTx, ClusterCache, SharedCache, TxConcurrency, TxIsolation};
use crate::structures::error::{RemovedSnafu, StructuresError};
use crate::structures::keys::StructureKey;
use crate::structures::values::{KindView, LatchValue};

/// Local proxy of a named count-down latch.
pub struct CountDownLatch {
    name: String,
    key: StructureKey,
    cache: SharedCache,
    view: KindView<LatchValue>,
    initial_count: i32,
    auto_delete: bool,
    count: watch::Sender<i32>,
    removed: AtomicBool,
}

impl CountDownLatch {
    pub(crate) fn new(name: impl Into<String>, cache: SharedCache, value: &LatchValue) -> Self {
        let name = name.into();
        let (count, _) = watch::channel(value.count);

        Self {
            key: StructureKey::new(name.clone()),
            view: KindView::new(cache.clone()),
            cache,
            initial_count: value.initial_count,
            auto_delete: value.auto_delete,
            count,
            removed: AtomicBool::new(false),
            name,
        }
    }

    /// The user-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The locally observed count. Non-increasing until removal.
    pub fn count(&self) -> i32 {
        *self.count.borrow()
    }

    /// The count the latch was created with.
    pub fn initial_count(&self) -> i32 {
        self.initial_count
    }

    /// Whether the latch deletes itself at zero.
    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Decrement the cluster count by one; returns the new count.
    pub async fn count_down(&self) -> Result<i32, StructuresError> {
        self.count_down_by(1).await
    }

    /// Decrement the cluster count by `amount` (floored at zero); returns
    /// the new count.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is negative.
    pub async fn count_down_by(&self, amount: i32) -> Result<i32, StructuresError> {
        assert!(amount >= 0, "count down amount cannot be negative");

        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;

        let Some(stored) = self.view.get_in(tx.as_mut(), &self.key).await? else {
            return RemovedSnafu { name: &self.name }.fail();
        };

        let next = LatchValue {
            count: (stored.count - amount).max(0),
            ..stored
        };

        self.view.put_in(tx.as_mut(), &self.key, next).await?;
        tx.commit().await?;

        Ok(next.count)
    }

    /// Drop the cluster count straight to zero.
    pub async fn count_down_all(&self) -> Result<(), StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;

        let Some(stored) = self.view.get_in(tx.as_mut(), &self.key).await? else {
            return RemovedSnafu { name: &self.name }.fail();
        };

        self.view
            .put_in(tx.as_mut(), &self.key, LatchValue { count: 0, ..stored })
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Suspend until the locally observed count reaches zero.
    ///
    /// Removal of the latch also releases waiters: a latch can only be
    /// removed once its count reached zero.
    pub async fn wait_for_zero(&self) -> Result<(), StructuresError> {
        let mut rx = self.count.subscribe();

        loop {
            if *rx.borrow_and_update() == 0 {
                return Ok(());
            }

            if rx.changed().await.is_err() {
                return RemovedSnafu { name: &self.name }.fail();
            }
        }
    }

    /// Like [`CountDownLatch::wait_for_zero`] with a deadline. Returns
    /// whether the count reached zero in time.
    pub async fn wait_for_zero_timeout(
        &self,
        timeout: Duration,
    ) -> Result<bool, StructuresError> {
        match tokio::time::timeout(timeout, self.wait_for_zero()).await {
            Ok(res) => res.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    /// Commit-hook delivery of a committed count.
    pub(crate) fn on_update(&self, new_count: i32) {
        self.count.send_if_modified(|cur| {
            // The cluster count is non-increasing; ignore stale deliveries.
            if new_count < *cur {
                *cur = new_count;
                true
            } else {
                false
            }
        });
    }

    /// Commit-hook delivery of the latch's removal.
    pub(crate) fn on_removed(&self) {
        self.removed.store(true, Ordering::Release);
        // Release any waiters; removal implies the count reached zero.
        self.count.send_replace(0);
    }

    async fn tx_internal(&self) -> Result<Box<dyn CacheTx>, StructuresError> {
        Ok(self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?)
    }

    fn ensure_active(&self) -> Result<(), StructuresError> {
        if self.removed.load(Ordering::Acquire) {
            return RemovedSnafu { name: &self.name }.fail();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{ClusterCache, MemoryCache};
    use crate::structures::values::StructureRecord;

    async fn seed(cache: &Arc<MemoryCache>, name: &str, count: i32) -> CountDownLatch {
        let value = LatchValue {
            count,
            initial_count: count,
            auto_delete: false,
        };
        let key = StructureKey::new(name).cache_key();
        cache
            .put(&key, &serde_json::to_string(&value.wrap()).unwrap())
            .await
            .unwrap();

        CountDownLatch::new(name, cache.clone(), &value)
    }

    #[tokio::test]
    async fn count_down_reaches_zero_and_floors() {
        let cache = MemoryCache::new("latch");
        let latch = seed(&cache, "l", 2).await;

        assert_eq!(latch.count_down().await.unwrap(), 1);
        assert_eq!(latch.count_down().await.unwrap(), 0);
        // Floors at zero instead of going negative.
        assert_eq!(latch.count_down().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_down_by_and_all() {
        let cache = MemoryCache::new("latch");
        let latch = seed(&cache, "l", 10).await;

        assert_eq!(latch.count_down_by(4).await.unwrap(), 6);

        latch.count_down_all().await.unwrap();
        assert_eq!(latch.count_down().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn waiters_wake_on_local_update() {
        let cache = MemoryCache::new("latch");
        let latch = Arc::new(seed(&cache, "l", 1).await);

        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait_for_zero().await })
        };

        tokio::task::yield_now().await;
        latch.on_update(0);

        waiter.await.unwrap().unwrap();
        assert_eq!(latch.count(), 0);
    }

    #[tokio::test]
    async fn update_is_monotonic() {
        let cache = MemoryCache::new("latch");
        let latch = seed(&cache, "l", 5).await;

        latch.on_update(3);
        assert_eq!(latch.count(), 3);

        // A stale, larger count must not resurrect the latch.
        latch.on_update(4);
        assert_eq!(latch.count(), 3);
    }

    #[tokio::test]
    async fn wait_with_timeout_expires() {
        let cache = MemoryCache::new("latch");
        let latch = seed(&cache, "l", 1).await;

        assert!(!latch
            .wait_for_zero_timeout(Duration::from_millis(20))
            .await
            .unwrap());

        latch.on_update(0);
        assert!(latch
            .wait_for_zero_timeout(Duration::from_millis(20))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn removal_releases_waiters_and_rejects_ops() {
        let cache = MemoryCache::new("latch");
        let latch = Arc::new(seed(&cache, "l", 1).await);

        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait_for_zero().await })
        };

        tokio::task::yield_now().await;
        latch.on_removed();

        waiter.await.unwrap().unwrap();

        assert!(matches!(
            latch.count_down().await,
            Err(StructuresError::Removed { .. })
        ));
    }
}
