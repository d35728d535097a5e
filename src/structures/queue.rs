//! Bounded FIFO queue over a cache-resident header.
//!
//! The header names, sizes and threads the queue; elements live in their
//! own key family addressed by `(header id, slot)`. On transactional caches
//! the header move and the element write share one pessimistic transaction.
//! On atomic caches the header is moved first through the transform
//! primitive, and the element entry is then touched with a bounded retry to
//! bridge the in-flight window between the two writes.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::cache::error::TimeoutSnafu;
use crate::cache::view::RecordTransform;
use crate::cache::{
    CacheError, CacheTx, CacheView, ClusterCache, SharedCache, TxConcurrency, TxIsolation,
};
use crate::structures::error::{
    NodeStoppingSnafu, QueueRemovedSnafu, StructuresError,
};
use crate::structures::keys::{QueueHeaderKey, QueueItemKey};
use crate::structures::reference::to_json;
use crate::structures::transforms::QueueHeaderFn;
use crate::structures::values::QueueHeader;

/// How long an atomic-mode operation bridges the gap between a moved
/// header and its element entry before giving up.
const ITEM_RETRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Erased queue proxy shared by every typed handle of one incarnation.
pub struct QueueProxy {
    name: String,
    id: Uuid,
    capacity: i32,
    collocated: bool,
    hdr_key: QueueHeaderKey,
    cache: SharedCache,
    hdr_view: CacheView<QueueHeader>,
    item_view: CacheView<Value>,
    /// Last header observed locally, refreshed by reads and by the
    /// manager's header watcher.
    header: RwLock<QueueHeader>,
    transactional: bool,
    removed: AtomicBool,
    stopped: AtomicBool,
}

impl QueueProxy {
    pub(crate) fn new(name: impl Into<String>, cache: SharedCache, header: QueueHeader) -> Self {
        let name = name.into();
        let transactional = cache.config().transactional();

        Self {
            hdr_key: QueueHeaderKey::new(name.clone()),
            hdr_view: CacheView::new(cache.clone()),
            item_view: CacheView::new(cache.clone()),
            cache,
            id: header.id,
            capacity: header.capacity,
            collocated: header.collocated,
            header: RwLock::new(header),
            transactional,
            removed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            name,
        }
    }

    /// The user-visible queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of this queue incarnation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Capacity bound; `0` means unbounded.
    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    /// Whether elements collocate with the header.
    pub fn collocated(&self) -> bool {
        self.collocated
    }

    /// Number of elements currently in the queue.
    pub async fn size(&self) -> Result<usize, StructuresError> {
        let hdr = self.read_header().await?;

        Ok(hdr.size() as usize)
    }

    pub(crate) async fn offer_json(&self, value: &Value) -> Result<bool, StructuresError> {
        self.ensure_running()?;

        if self.transactional {
            self.offer_tx(value).await
        } else {
            self.offer_atomic(value).await
        }
    }

    async fn offer_tx(&self, value: &Value) -> Result<bool, StructuresError> {
        let mut tx = self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?;

        let hdr_key = self.hdr_key.cache_key();
        let hdr = self.require_header(self.hdr_view.get_in(tx.as_mut(), &hdr_key).await?)?;

        let Some(next) = QueueHeaderFn::ReserveTail { id: self.id }.apply(Some(hdr)) else {
            return self.removed_failure();
        };

        if next.tail == hdr.tail {
            // Full; dropping the transaction releases the header lock.
            return Ok(false);
        }

        self.hdr_view.put_in(tx.as_mut(), &hdr_key, &next).await?;
        self.item_view
            .put_in(
                tx.as_mut(),
                &QueueItemKey::new(self.id, hdr.tail).cache_key(),
                value,
            )
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn offer_atomic(&self, value: &Value) -> Result<bool, StructuresError> {
        let hdr_key = self.hdr_key.cache_key();
        let (old, new) = self
            .hdr_view
            .transform(&hdr_key, &QueueHeaderFn::ReserveTail { id: self.id })
            .await?;

        let old = self.require_header(old)?;

        if let Some(new) = new {
            self.observe_header(new);

            if new.tail == old.tail {
                return Ok(false);
            }
        }

        self.item_view
            .put(&QueueItemKey::new(self.id, old.tail).cache_key(), value)
            .await?;

        Ok(true)
    }

    pub(crate) async fn poll_json(&self) -> Result<Option<Value>, StructuresError> {
        self.ensure_running()?;

        if self.transactional {
            self.poll_tx().await
        } else {
            self.poll_atomic().await
        }
    }

    async fn poll_tx(&self) -> Result<Option<Value>, StructuresError> {
        let mut tx = self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?;

        let hdr_key = self.hdr_key.cache_key();
        let hdr = self.require_header(self.hdr_view.get_in(tx.as_mut(), &hdr_key).await?)?;

        if hdr.empty() {
            return Ok(None);
        }

        let Some(next) = QueueHeaderFn::AdvanceHead { id: self.id }.apply(Some(hdr)) else {
            return self.removed_failure();
        };

        let item_key = QueueItemKey::new(self.id, hdr.head).cache_key();
        let value = self.item_view.get_in(tx.as_mut(), &item_key).await?;

        let Some(value) = value else {
            // Header and element commit together on transactional caches;
            // a hole means the queue data is corrupted.
            return Err(StructuresError::from(CacheError::Backend {
                message: format!("queue item missing at '{item_key}'"),
            }));
        };

        self.hdr_view.put_in(tx.as_mut(), &hdr_key, &next).await?;
        self.item_view.remove_in(tx.as_mut(), &item_key).await?;
        tx.commit().await?;

        Ok(Some(value))
    }

    async fn poll_atomic(&self) -> Result<Option<Value>, StructuresError> {
        let hdr_key = self.hdr_key.cache_key();
        let (old, new) = self
            .hdr_view
            .transform(&hdr_key, &QueueHeaderFn::AdvanceHead { id: self.id })
            .await?;

        let old = self.require_header(old)?;

        if let Some(new) = new {
            self.observe_header(new);
        }

        if old.empty() {
            return Ok(None);
        }

        let item_key = QueueItemKey::new(self.id, old.head).cache_key();
        let value = self.await_item(&item_key, true).await?;

        Ok(Some(value))
    }

    pub(crate) async fn peek_json(&self) -> Result<Option<Value>, StructuresError> {
        self.ensure_running()?;

        let deadline = Instant::now() + ITEM_RETRY_TIMEOUT;

        loop {
            let hdr = self.read_header().await?;

            if hdr.empty() {
                return Ok(None);
            }

            let item_key = QueueItemKey::new(self.id, hdr.head).cache_key();

            if let Some(value) = self.item_view.get(&item_key).await? {
                return Ok(Some(value));
            }

            // The head element is in flight (atomic offer) or was polled
            // between the two reads; re-check the header after a pause.
            if Instant::now() >= deadline {
                return Err(StructuresError::from(
                    TimeoutSnafu {
                        key: item_key,
                        operation: "peek",
                    }
                    .build(),
                ));
            }

            retry_pause().await;
        }
    }

    /// Drain all elements currently threaded through the header.
    pub async fn clear(&self, batch_size: i32) -> Result<(), StructuresError> {
        self.ensure_running()?;

        let (old, _) = self
            .hdr_view
            .transform(&self.hdr_key.cache_key(), &QueueHeaderFn::Clear { id: self.id })
            .await?;

        let old = self.require_header(old)?;

        if old.empty() {
            return Ok(());
        }

        remove_item_keys(&self.cache, self.id, old.head, old.tail, batch_size).await?;

        Ok(())
    }

    /// Header watcher delivery of a fresh header for this queue's name.
    ///
    /// Headers are routed by name; a header of a different incarnation
    /// (same name recreated after a removal) is ignored.
    pub(crate) fn on_header_changed(&self, hdr: QueueHeader) {
        if hdr.id != self.id {
            return;
        }

        self.observe_header(hdr);
    }

    /// Node shutdown: reject further operations.
    pub(crate) fn on_node_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn observe_header(&self, hdr: QueueHeader) {
        if hdr.removed {
            self.removed.store(true, Ordering::Release);
        }

        *self.header.write() = hdr;
    }

    /// Fetch the current header, refreshing the local mirror. Surfaces
    /// `QueueRemoved` when the header is gone or tombstoned.
    async fn read_header(&self) -> Result<QueueHeader, StructuresError> {
        self.ensure_running()?;

        let stored = self.hdr_view.get(&self.hdr_key.cache_key()).await?;
        let hdr = self.require_header(stored)?;

        self.observe_header(hdr);

        Ok(hdr)
    }

    /// Wait out the window between a moved header and its element entry.
    async fn await_item(&self, item_key: &str, remove: bool) -> Result<Value, StructuresError> {
        let deadline = Instant::now() + ITEM_RETRY_TIMEOUT;

        loop {
            let found = if remove {
                self.item_view.remove(item_key).await?
            } else {
                self.item_view.get(item_key).await?
            };

            if let Some(value) = found {
                return Ok(value);
            }

            if Instant::now() >= deadline {
                return Err(StructuresError::from(
                    TimeoutSnafu {
                        key: item_key,
                        operation: "poll",
                    }
                    .build(),
                ));
            }

            retry_pause().await;
        }
    }

    fn require_header(&self, hdr: Option<QueueHeader>) -> Result<QueueHeader, StructuresError> {
        match hdr {
            Some(h) if h.id != self.id => {
                // The name was recreated with a fresh incarnation; this
                // proxy's queue is gone.
                self.removed.store(true, Ordering::Release);

                self.removed_failure()
            }
            Some(h) if !h.removed => Ok(h),
            Some(h) => {
                self.observe_header(h);

                self.removed_failure()
            }
            None => {
                self.removed.store(true, Ordering::Release);

                self.removed_failure()
            }
        }
    }

    fn removed_failure<T>(&self) -> Result<T, StructuresError> {
        QueueRemovedSnafu { name: &self.name }.fail()
    }

    fn ensure_running(&self) -> Result<(), StructuresError> {
        if self.stopped.load(Ordering::Acquire) {
            return NodeStoppingSnafu.fail();
        }

        if self.removed.load(Ordering::Acquire) {
            return self.removed_failure();
        }

        Ok(())
    }
}

async fn retry_pause() {
    let jitter = rand::rng().random_range(1..=5);
    tokio::time::sleep(Duration::from_millis(jitter)).await;
}

/// Remove the element entries of the `[from, to)` window in bounded
/// concurrent batches. Missing entries are skipped.
pub(crate) async fn remove_item_keys(
    cache: &SharedCache,
    id: Uuid,
    from: i64,
    to: i64,
    batch_size: i32,
) -> Result<(), CacheError> {
    let batch = batch_size.max(1) as usize;
    let keys: Vec<String> = (from..to)
        .map(|idx| QueueItemKey::new(id, idx).cache_key())
        .collect();

    for chunk in keys.chunks(batch) {
        futures::future::try_join_all(chunk.iter().map(|key| cache.remove(key))).await?;
    }

    Ok(())
}

/// Typed handle to a named queue.
pub struct Queue<T> {
    proxy: Arc<QueueProxy>,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> Queue<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(proxy: Arc<QueueProxy>) -> Self {
        Self {
            proxy,
            _item: PhantomData,
        }
    }

    /// The user-visible queue name.
    pub fn name(&self) -> &str {
        self.proxy.name()
    }

    /// Identity of this queue incarnation.
    pub fn id(&self) -> Uuid {
        self.proxy.id()
    }

    /// Capacity bound; `0` means unbounded.
    pub fn capacity(&self) -> i32 {
        self.proxy.capacity()
    }

    /// Whether elements collocate with the header.
    pub fn collocated(&self) -> bool {
        self.proxy.collocated()
    }

    /// Append an element. Returns `false` when the queue is full.
    pub async fn offer(&self, item: &T) -> Result<bool, StructuresError> {
        self.proxy.offer_json(&to_json(item)?).await
    }

    /// Remove and return the oldest element, or `None` when empty.
    pub async fn poll(&self) -> Result<Option<T>, StructuresError> {
        self.decode(self.proxy.poll_json().await?)
    }

    /// Return the oldest element without removing it.
    pub async fn peek(&self) -> Result<Option<T>, StructuresError> {
        self.decode(self.proxy.peek_json().await?)
    }

    /// Number of elements currently in the queue.
    pub async fn size(&self) -> Result<usize, StructuresError> {
        self.proxy.size().await
    }

    /// Whether the queue holds no elements.
    pub async fn is_empty(&self) -> Result<bool, StructuresError> {
        Ok(self.size().await? == 0)
    }

    /// Drain all elements, removing element entries in batches of
    /// `batch_size`.
    pub async fn clear(&self, batch_size: i32) -> Result<(), StructuresError> {
        self.proxy.clear(batch_size).await
    }

    fn decode(&self, value: Option<Value>) -> Result<Option<T>, StructuresError> {
        value
            .map(|v| {
                serde_json::from_value(v).map_err(|source| {
                    StructuresError::from(CacheError::Decode {
                        key: QueueHeaderKey::new(self.name()).cache_key(),
                        source,
                    })
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{
        AtomicityMode, CacheConfig, CacheMode, ClusterCache, MemoryCache, WriteOrderMode,
    };

    async fn seed_queue(cache: &SharedCache, name: &str, capacity: i32) -> Arc<QueueProxy> {
        let header = QueueHeader::new(Uuid::new_v4(), capacity, true);
        let view: CacheView<QueueHeader> = CacheView::new(cache.clone());
        view.put(&QueueHeaderKey::new(name).cache_key(), &header)
            .await
            .unwrap();

        Arc::new(QueueProxy::new(name, cache.clone(), header))
    }

    fn atomic_cache(name: &str) -> SharedCache {
        MemoryCache::with_config(
            name,
            CacheConfig {
                mode: CacheMode::Partitioned,
                atomicity: AtomicityMode::Atomic,
                write_order: WriteOrderMode::Primary,
                near_enabled: false,
                ..CacheConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn fifo_order_transactional() {
        let cache: SharedCache = MemoryCache::new("queue");
        let q: Queue<String> = Queue::new(seed_queue(&cache, "q", 0).await);

        for s in ["a", "b", "c"] {
            assert!(q.offer(&s.to_string()).await.unwrap());
        }

        assert_eq!(q.size().await.unwrap(), 3);
        assert_eq!(q.peek().await.unwrap().as_deref(), Some("a"));
        assert_eq!(q.poll().await.unwrap().as_deref(), Some("a"));
        assert_eq!(q.poll().await.unwrap().as_deref(), Some("b"));
        assert_eq!(q.poll().await.unwrap().as_deref(), Some("c"));
        assert_eq!(q.poll().await.unwrap(), None);
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn fifo_order_atomic() {
        let cache = atomic_cache("queue");
        let q: Queue<i32> = Queue::new(seed_queue(&cache, "q", 0).await);

        for i in 0..5 {
            assert!(q.offer(&i).await.unwrap());
        }

        for i in 0..5 {
            assert_eq!(q.poll().await.unwrap(), Some(i));
        }

        assert_eq!(q.poll().await.unwrap(), None);
    }

    #[tokio::test]
    async fn capacity_bound_rejects_offer() {
        let cache: SharedCache = MemoryCache::new("queue");
        let q: Queue<i32> = Queue::new(seed_queue(&cache, "q", 2).await);

        assert!(q.offer(&1).await.unwrap());
        assert!(q.offer(&2).await.unwrap());
        assert!(!q.offer(&3).await.unwrap());

        assert_eq!(q.poll().await.unwrap(), Some(1));
        assert!(q.offer(&3).await.unwrap());
    }

    #[tokio::test]
    async fn removed_header_surfaces_queue_removed() {
        let cache: SharedCache = MemoryCache::new("queue");
        let proxy = seed_queue(&cache, "q", 0).await;

        cache
            .remove(&QueueHeaderKey::new("q").cache_key())
            .await
            .unwrap();

        assert!(matches!(
            proxy.size().await,
            Err(StructuresError::QueueRemoved { .. })
        ));

        // The proxy stays rejected once removal was observed.
        let q: Queue<i32> = Queue::new(proxy);
        assert!(matches!(
            q.offer(&1).await,
            Err(StructuresError::QueueRemoved { .. })
        ));
    }

    #[tokio::test]
    async fn clear_drains_elements_and_their_entries() {
        let cache: SharedCache = MemoryCache::new("queue");
        let proxy = seed_queue(&cache, "q", 0).await;
        let q: Queue<i32> = Queue::new(proxy.clone());

        for i in 0..6 {
            q.offer(&i).await.unwrap();
        }

        q.clear(2).await.unwrap();

        assert_eq!(q.size().await.unwrap(), 0);

        for idx in 0..6 {
            let key = QueueItemKey::new(proxy.id(), idx).cache_key();
            assert_eq!(cache.get(&key).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn stopped_node_rejects_operations() {
        let cache: SharedCache = MemoryCache::new("queue");
        let proxy = seed_queue(&cache, "q", 0).await;

        proxy.on_node_stop();

        let q: Queue<i32> = Queue::new(proxy);
        assert!(matches!(
            q.offer(&1).await,
            Err(StructuresError::NodeStopping)
        ));
    }

    #[tokio::test]
    async fn concurrent_offers_land_in_distinct_slots() {
        let cache: SharedCache = MemoryCache::new("queue");
        let q: Queue<i32> = Queue::new(seed_queue(&cache, "q", 0).await);

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let q = q.clone();
                tokio::spawn(async move { q.offer(&i).await })
            })
            .collect();

        for t in tasks {
            assert!(t.await.unwrap().unwrap());
        }

        let mut drained = Vec::new();
        while let Some(v) = q.poll().await.unwrap() {
            drained.push(v);
        }

        drained.sort_unstable();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
    }
}
