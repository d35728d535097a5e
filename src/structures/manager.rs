//! The data-structures manager.
//!
//! One manager instance runs per node on top of one backing cache. It owns
//! the local proxy registries, serializes create/lookup/remove of every
//! named structure through pessimistic repeatable-read transactions, relays
//! committed latch updates to local proxies, and multiplexes the queue
//! header change feed to local queue proxies. Shutdown is interlocked with
//! both feeds through a busy lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cache::{
    CacheTx, CacheView, ClusterCache, CommitHook, EntryOp, SharedCache, TxConcurrency,
    TxIsolation, WriteEntry,
};
use crate::structures::atomic_long::AtomicLong;
use crate::structures::error::{
    BusyLatchSnafu, InterruptedSnafu, ModeMismatchSnafu, NodeStoppingSnafu, NotInitializedSnafu,
    QueueConflictSnafu, StructuresError, TypeMismatchSnafu,
};
use crate::structures::keys::{QueueHeaderKey, StructureKey};
use crate::structures::latch::CountDownLatch;
use crate::structures::queue::{remove_item_keys, Queue, QueueProxy};
use crate::structures::reference::{
    to_json, AtomicReference, AtomicStamped, ReferenceProxy, StampedProxy,
};
use crate::structures::sequence::{reserved_bounds, AtomicSequence};
use crate::structures::values::{
    AtomicLongValue, AtomicReferenceValue, AtomicStampedValue, KindView, LatchValue,
    QueueHeader, SequenceValue, StructureKind, StructureRecord, StructureValue,
};
use crate::utils::{BusyLock, InitGate, InitState};

/// Registry entry: a local proxy tagged with its kind.
#[derive(Clone)]
enum RegisteredProxy {
    Sequence(Arc<AtomicSequence>),
    Long(Arc<AtomicLong>),
    Reference(Arc<ReferenceProxy>),
    Stamped(Arc<StampedProxy>),
    Latch(Arc<CountDownLatch>),
}

impl RegisteredProxy {
    fn kind(&self) -> StructureKind {
        match self {
            RegisteredProxy::Sequence(_) => StructureKind::Sequence,
            RegisteredProxy::Long(_) => StructureKind::AtomicLong,
            RegisteredProxy::Reference(_) => StructureKind::AtomicReference,
            RegisteredProxy::Stamped(_) => StructureKind::AtomicStamped,
            RegisteredProxy::Latch(_) => StructureKind::Latch,
        }
    }

    fn on_removed(&self) {
        match self {
            RegisteredProxy::Sequence(p) => p.on_removed(),
            RegisteredProxy::Long(p) => p.on_removed(),
            RegisteredProxy::Reference(p) => p.on_removed(),
            RegisteredProxy::Stamped(p) => p.on_removed(),
            RegisteredProxy::Latch(p) => p.on_removed(),
        }
    }
}

/// A proxy type that can live in the registry.
trait ProxyKind: Sized {
    const KIND: StructureKind;

    fn register(proxy: Arc<Self>) -> RegisteredProxy;

    fn extract(registered: &RegisteredProxy) -> Option<Arc<Self>>;
}

macro_rules! impl_proxy_kind {
    ($proxy:ty, $variant:ident, $kind:expr) => {
        impl ProxyKind for $proxy {
            const KIND: StructureKind = $kind;

            fn register(proxy: Arc<Self>) -> RegisteredProxy {
                RegisteredProxy::$variant(proxy)
            }

            fn extract(registered: &RegisteredProxy) -> Option<Arc<Self>> {
                match registered {
                    RegisteredProxy::$variant(p) => Some(p.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_proxy_kind!(AtomicSequence, Sequence, StructureKind::Sequence);
impl_proxy_kind!(AtomicLong, Long, StructureKind::AtomicLong);
impl_proxy_kind!(ReferenceProxy, Reference, StructureKind::AtomicReference);
impl_proxy_kind!(StampedProxy, Stamped, StructureKind::AtomicStamped);
impl_proxy_kind!(CountDownLatch, Latch, StructureKind::Latch);

/// Registry sizes, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Number of registered scalar structure proxies.
    pub structures: usize,
    /// Number of registered queue proxies.
    pub queues: usize,
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "structures={}, queues={}",
            self.structures, self.queues
        )
    }
}

/// Manager of named data structures over one backing cache.
pub struct DataStructuresManager {
    cache: SharedCache,
    hdr_view: CacheView<QueueHeader>,
    structures: DashMap<StructureKey, RegisteredProxy>,
    queues: DashMap<Uuid, Arc<QueueProxy>>,
    init: InitGate,
    busy: BusyLock,
    started: AtomicBool,
    watcher_started: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl DataStructuresManager {
    /// Create a manager bound to the given cache. Operations suspend until
    /// [`DataStructuresManager::start`] resolves the initialization gate.
    pub fn new(cache: SharedCache) -> Arc<Self> {
        Arc::new(Self {
            hdr_view: CacheView::new(cache.clone()),
            cache,
            structures: DashMap::new(),
            queues: DashMap::new(),
            init: InitGate::new(),
            busy: BusyLock::new(),
            started: AtomicBool::new(false),
            watcher_started: AtomicBool::new(false),
            watcher: Mutex::new(None),
        })
    }

    /// Kernel-start hook: register the commit hook and open the gate.
    pub fn start(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.cache.register_commit_hook(Arc::new(LatchNotifier {
            mgr: Arc::downgrade(self),
        }));

        self.init.set_ready();
    }

    /// Shut the manager down: fence out feed callbacks, close the queue
    /// header watcher and release queue proxy resources.
    pub async fn stop(&self) {
        self.busy.block().await;

        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
            debug!("queue header watcher closed");
        }

        for entry in self.queues.iter() {
            entry.value().on_node_stop();
        }
    }

    /// Registry sizes.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            structures: self.structures.len(),
            queues: self.queues.len(),
        }
    }

    // ========================================================================
    // Sequence
    // ========================================================================

    /// Get or create the named sequence.
    ///
    /// `init_val` seeds the first reservation and is ignored when the
    /// sequence already exists. With `create == false`, `None` is returned
    /// for an absent sequence.
    pub async fn sequence(
        &self,
        name: &str,
        init_val: i64,
        create: bool,
    ) -> Result<Option<Arc<AtomicSequence>>, StructuresError> {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        let key = StructureKey::new(name);

        if let Some(existing) = self.lookup::<AtomicSequence>(&key)? {
            return Ok(Some(existing));
        }

        let reserve = self.cache.config().sequence_reserve_size;
        let view = KindView::<SequenceValue>::new(self.cache.clone());

        let result = async {
            let mut tx = self
                .cache
                .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
                .await?;

            let stored = view.get_in(tx.as_mut(), &key).await?;

            // Another requester may have published while we awaited the lock.
            if let Some(existing) = self.lookup::<AtomicSequence>(&key)? {
                return Ok(Some(existing));
            }

            let start = match stored {
                Some(v) => v.next,
                None if !create => {
                    tx.set_rollback_only();

                    return Ok(None);
                }
                None => init_val,
            };

            // The local span is claimed here; the persisted counter moves
            // past it so no other node can hand out the same ids.
            let (up_bound, next_global) =
                reserved_bounds(start, reserve).ok_or_else(|| {
                    crate::structures::error::SequenceOverflowSnafu { name }.build()
                })?;

            view.put_in(tx.as_mut(), &key, SequenceValue { next: next_global })
                .await?;

            let proxy = Arc::new(AtomicSequence::new(
                name,
                self.cache.clone(),
                reserve,
                start,
                up_bound,
            ));

            self.structures
                .insert(key.clone(), RegisteredProxy::Sequence(proxy.clone()));

            tx.commit().await?;

            Ok(Some(proxy))
        }
        .await;

        self.cleanup_on_failure(&key, StructureKind::Sequence, &result);

        result
    }

    /// Remove the named sequence. Returns whether an entry was removed.
    pub async fn remove_sequence(&self, name: &str) -> Result<bool, StructuresError> {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        self.remove_structure::<SequenceValue>(name).await
    }

    // ========================================================================
    // Atomic long
    // ========================================================================

    /// Get or create the named atomic long. `init_val` is ignored when it
    /// already exists.
    pub async fn atomic_long(
        &self,
        name: &str,
        init_val: i64,
        create: bool,
    ) -> Result<Option<Arc<AtomicLong>>, StructuresError> {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        self.load_structure(
            name,
            create,
            || AtomicLongValue { v: init_val },
            |_| AtomicLong::new(name, self.cache.clone()),
        )
        .await
    }

    /// Remove the named atomic long.
    pub async fn remove_atomic_long(&self, name: &str) -> Result<bool, StructuresError> {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        self.remove_structure::<AtomicLongValue>(name).await
    }

    // ========================================================================
    // Atomic reference / stamped
    // ========================================================================

    /// Get or create the named atomic reference. `init_val` is ignored when
    /// it already exists.
    pub async fn atomic_reference<T>(
        &self,
        name: &str,
        init_val: &T,
        create: bool,
    ) -> Result<Option<AtomicReference<T>>, StructuresError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        let init_json = to_json(init_val)?;

        let proxy = self
            .load_structure(
                name,
                create,
                move || AtomicReferenceValue { v: init_json },
                |_| ReferenceProxy::new(name, self.cache.clone()),
            )
            .await?;

        Ok(proxy.map(AtomicReference::new))
    }

    /// Remove the named atomic reference.
    pub async fn remove_atomic_reference(&self, name: &str) -> Result<bool, StructuresError> {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        self.remove_structure::<AtomicReferenceValue>(name).await
    }

    /// Get or create the named atomic stamped reference. `init_val` and
    /// `init_stamp` are ignored when it already exists.
    pub async fn atomic_stamped<T, S>(
        &self,
        name: &str,
        init_val: &T,
        init_stamp: &S,
        create: bool,
    ) -> Result<Option<AtomicStamped<T, S>>, StructuresError>
    where
        T: Serialize + DeserializeOwned,
        S: Serialize + DeserializeOwned,
    {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        let init_json = to_json(init_val)?;
        let stamp_json = to_json(init_stamp)?;

        let proxy = self
            .load_structure(
                name,
                create,
                move || AtomicStampedValue {
                    v: init_json,
                    stamp: stamp_json,
                },
                |_| StampedProxy::new(name, self.cache.clone()),
            )
            .await?;

        Ok(proxy.map(AtomicStamped::new))
    }

    /// Remove the named atomic stamped reference.
    pub async fn remove_atomic_stamped(&self, name: &str) -> Result<bool, StructuresError> {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        self.remove_structure::<AtomicStampedValue>(name).await
    }

    // ========================================================================
    // Count-down latch
    // ========================================================================

    /// Get or create the named count-down latch. With `create == false` all
    /// parameters except the name are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `count` is negative.
    pub async fn count_down_latch(
        &self,
        name: &str,
        count: i32,
        auto_delete: bool,
        create: bool,
    ) -> Result<Option<Arc<CountDownLatch>>, StructuresError> {
        assert!(count >= 0, "latch count cannot be negative");

        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        self.load_structure(
            name,
            create,
            || LatchValue {
                count,
                initial_count: count,
                auto_delete,
            },
            |value| CountDownLatch::new(name, self.cache.clone(), value),
        )
        .await
    }

    /// Remove the named latch. Refuses a latch whose count has not reached
    /// zero.
    pub async fn remove_count_down_latch(&self, name: &str) -> Result<bool, StructuresError> {
        self.wait_initialization().await?;
        self.check_transactional_with_near()?;

        let key = StructureKey::new(name);
        let view = KindView::<LatchValue>::new(self.cache.clone());

        let mut tx = self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?;

        match view.get_in(tx.as_mut(), &key).await? {
            Some(value) if value.count > 0 => {
                tx.set_rollback_only();

                error!(
                    name,
                    count = value.count,
                    "refusing to remove latch with non-zero count"
                );

                BusyLatchSnafu {
                    name,
                    count: value.count,
                }
                .fail()
            }
            Some(_) => {
                view.remove_in(tx.as_mut(), &key).await?;
                tx.commit().await?;

                Ok(true)
            }
            None => {
                tx.set_rollback_only();

                Ok(false)
            }
        }
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Get or create the named queue.
    ///
    /// A pre-existing queue must match `capacity` and the effective
    /// collocation flag, otherwise the call fails with
    /// [`StructuresError::QueueConflict`]. Non-partitioned caches force
    /// collocation on.
    pub async fn queue<T>(
        self: &Arc<Self>,
        name: &str,
        capacity: i32,
        collocated: bool,
        create: bool,
    ) -> Result<Option<Queue<T>>, StructuresError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.wait_initialization().await?;
        self.check_supports_queue()?;

        // Non-collocated layout only makes sense for partitioned caches.
        let eff_collocated = !self.cache.config().is_partitioned() || collocated;

        let key = QueueHeaderKey::new(name);

        let header = if create {
            let fresh = QueueHeader::new(Uuid::new_v4(), capacity, eff_collocated);

            match self.hdr_view.put_if_absent(&key.cache_key(), &fresh).await? {
                Some(existing) => {
                    if existing.capacity != capacity || existing.collocated != eff_collocated {
                        return QueueConflictSnafu {
                            name,
                            capacity: existing.capacity,
                            collocated: existing.collocated,
                        }
                        .fail();
                    }

                    existing
                }
                None => fresh,
            }
        } else {
            match self.hdr_view.get(&key.cache_key()).await? {
                Some(existing) => existing,
                None => return Ok(None),
            }
        };

        self.ensure_header_watcher();

        let proxy = self
            .queues
            .entry(header.id)
            .or_insert_with(|| Arc::new(QueueProxy::new(name, self.cache.clone(), header)))
            .clone();

        Ok(Some(Queue::new(proxy)))
    }

    /// Remove the named queue, deleting element entries in batches of
    /// `batch_size`. Returns whether a header was removed.
    pub async fn remove_queue(
        &self,
        name: &str,
        batch_size: i32,
    ) -> Result<bool, StructuresError> {
        self.wait_initialization().await?;
        self.check_supports_queue()?;

        let key = QueueHeaderKey::new(name);

        match self.hdr_view.remove(&key.cache_key()).await? {
            None => Ok(false),
            Some(header) => {
                if !header.empty() {
                    remove_item_keys(
                        &self.cache,
                        header.id,
                        header.head,
                        header.tail,
                        batch_size,
                    )
                    .await?;
                }

                Ok(true)
            }
        }
    }

    // ========================================================================
    // Shared choreography
    // ========================================================================

    /// Common get-or-create slow path for scalar structures.
    async fn load_structure<R, P, I, B>(
        &self,
        name: &str,
        create: bool,
        init: I,
        build: B,
    ) -> Result<Option<Arc<P>>, StructuresError>
    where
        R: StructureRecord + Clone,
        P: ProxyKind,
        I: FnOnce() -> R,
        B: FnOnce(&R) -> P,
    {
        let key = StructureKey::new(name);

        if let Some(existing) = self.lookup::<P>(&key)? {
            return Ok(Some(existing));
        }

        let view = KindView::<R>::new(self.cache.clone());

        let result = async {
            let mut tx = self
                .cache
                .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
                .await?;

            let stored = view.get_in(tx.as_mut(), &key).await?;

            // Another requester may have published while we awaited the lock.
            if let Some(existing) = self.lookup::<P>(&key)? {
                return Ok(Some(existing));
            }

            let record = match stored {
                Some(record) => record,
                None if !create => {
                    tx.set_rollback_only();

                    return Ok(None);
                }
                None => {
                    let record = init();
                    view.put_in(tx.as_mut(), &key, record.clone()).await?;

                    record
                }
            };

            let proxy = Arc::new(build(&record));

            self.structures.insert(key.clone(), P::register(proxy.clone()));

            tx.commit().await?;

            Ok(Some(proxy))
        }
        .await;

        self.cleanup_on_failure(&key, P::KIND, &result);

        result
    }

    /// Type-checked removal of a scalar structure entry.
    async fn remove_structure<R>(&self, name: &str) -> Result<bool, StructuresError>
    where
        R: StructureRecord,
    {
        let key = StructureKey::new(name);
        let view = KindView::<R>::new(self.cache.clone());

        let mut tx = self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?;

        match view.get_in(tx.as_mut(), &key).await? {
            Some(_) => {
                view.remove_in(tx.as_mut(), &key).await?;
                tx.commit().await?;

                Ok(true)
            }
            None => {
                tx.set_rollback_only();

                Ok(false)
            }
        }
    }

    /// Local fast-path lookup with a kind check.
    fn lookup<P: ProxyKind>(
        &self,
        key: &StructureKey,
    ) -> Result<Option<Arc<P>>, StructuresError> {
        let Some(entry) = self.structures.get(key) else {
            return Ok(None);
        };

        let registered = entry.value().clone();
        drop(entry);

        match P::extract(&registered) {
            Some(proxy) => Ok(Some(proxy)),
            None => TypeMismatchSnafu {
                name: key.name(),
                expected: P::KIND,
                actual: registered.kind(),
            }
            .fail(),
        }
    }

    fn cleanup_on_failure<T>(
        &self,
        key: &StructureKey,
        kind: StructureKind,
        result: &Result<T, StructuresError>,
    ) {
        if let Err(err) = result {
            self.structures.remove(key);

            error!(name = %key, %kind, %err, "failed to make data structure");
        }
    }

    async fn wait_initialization(&self) -> Result<(), StructuresError> {
        match self.init.wait().await {
            Some(InitState::Ready) => {}
            Some(InitState::Pending) | Some(InitState::Failed) => {
                return NotInitializedSnafu {
                    cache: self.cache.name(),
                }
                .fail();
            }
            None => return InterruptedSnafu.fail(),
        }

        if self.busy.is_blocked() {
            return NodeStoppingSnafu.fail();
        }

        Ok(())
    }

    fn check_transactional_with_near(&self) -> Result<(), StructuresError> {
        let config = self.cache.config();

        if config.atomic() {
            return ModeMismatchSnafu {
                reason: "data structures require transactional atomicity mode",
            }
            .fail();
        }

        if !config.is_replicated() && !config.is_local() && !config.near_enabled {
            return ModeMismatchSnafu {
                reason: "data structures cannot be used with near cache disabled",
            }
            .fail();
        }

        Ok(())
    }

    fn check_supports_queue(&self) -> Result<(), StructuresError> {
        let config = self.cache.config();

        if config.atomic()
            && !config.is_local()
            && config.write_order == crate::cache::WriteOrderMode::Clock
        {
            return ModeMismatchSnafu {
                reason: "queues cannot be used on an atomic cache with clock write order",
            }
            .fail();
        }

        Ok(())
    }

    // ========================================================================
    // Queue header watcher
    // ========================================================================

    /// Install the single header watcher the first time any queue proxy is
    /// constructed locally.
    fn ensure_header_watcher(self: &Arc<Self>) {
        if self
            .watcher_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let mut feed = self.cache.subscribe();
        let mgr = Arc::downgrade(self);

        let watcher = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        let Some(key) = QueueHeaderKey::parse(&event.key) else {
                            continue;
                        };

                        let Some(mgr) = mgr.upgrade() else {
                            break;
                        };

                        mgr.on_header_event(key.name(), event.new.as_deref());
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "queue header feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        *self.watcher.lock() = Some(watcher);
    }

    /// Route one header change to every local proxy of that queue name.
    fn on_header_event(self: &Arc<Self>, name: &str, new_raw: Option<&str>) {
        if !self.busy.try_enter() {
            return;
        }

        let targets: Vec<Arc<QueueProxy>> = self
            .queues
            .iter()
            .filter(|entry| entry.value().name() == name)
            .map(|entry| entry.value().clone())
            .collect();

        match new_raw {
            Some(raw) => match serde_json::from_str::<QueueHeader>(raw) {
                Ok(header) => {
                    for queue in targets {
                        queue.on_header_changed(header);
                    }
                }
                Err(err) => {
                    // Feed failures must never poison the watcher.
                    debug!(%err, name, "ignoring undecodable queue header event");
                }
            },
            None => {
                for queue in targets {
                    self.spawn_removal_probe(queue);
                }
            }
        }

        self.busy.leave();
    }

    /// Probe whether a queue whose header vanished is truly gone; the name
    /// may have been recreated with a fresh header id in the meantime.
    fn spawn_removal_probe(self: &Arc<Self>, queue: Arc<QueueProxy>) {
        let mgr = Arc::downgrade(self);

        tokio::spawn(async move {
            let Some(mgr) = mgr.upgrade() else {
                return;
            };

            if !mgr.busy.try_enter() {
                return;
            }

            if matches!(
                queue.size().await,
                Err(StructuresError::QueueRemoved { .. })
            ) {
                mgr.queues.remove(&queue.id());
            }

            mgr.busy.leave();
        });
    }

    /// Commit-hook dispatch: latch updates and structure removals.
    fn dispatch_committed(&self, entries: &[WriteEntry]) {
        for entry in entries {
            let Some(key) = StructureKey::parse(&entry.key) else {
                continue;
            };

            match entry.op {
                EntryOp::Create | EntryOp::Update => {
                    let Some(raw) = entry.value.as_deref() else {
                        continue;
                    };

                    let Ok(value) = serde_json::from_str::<StructureValue>(raw) else {
                        debug!(name = %key, "ignoring undecodable committed structure value");
                        continue;
                    };

                    if let StructureValue::Latch(latch_value) = value {
                        self.notify_latch(&key, &entry.key, latch_value);
                    }
                }
                EntryOp::Delete => {
                    if let Some((_, proxy)) = self.structures.remove(&key) {
                        proxy.on_removed();
                    }
                }
            }
        }
    }

    fn notify_latch(&self, key: &StructureKey, raw_key: &str, value: LatchValue) {
        let registered = self.structures.get(key).map(|entry| entry.value().clone());

        match registered {
            Some(RegisteredProxy::Latch(latch)) => {
                latch.on_update(value.count);

                if value.count == 0 && value.auto_delete {
                    self.cache.mark_obsolete(raw_key);
                    self.structures.remove(key);
                    latch.on_removed();
                }
            }
            Some(other) => {
                // Mismatches on the feed are logged, never raised.
                error!(
                    name = %key,
                    expected = %StructureKind::Latch,
                    actual = %other.kind(),
                    "committed latch value does not match registered structure"
                );
            }
            None => {}
        }
    }
}

/// Commit hook relaying latch commits and structure removals to the local
/// registry.
struct LatchNotifier {
    mgr: Weak<DataStructuresManager>,
}

impl CommitHook for LatchNotifier {
    fn on_committed(&self, entries: &[WriteEntry]) {
        let Some(mgr) = self.mgr.upgrade() else {
            return;
        };

        if !mgr.busy.try_enter() {
            return;
        }

        mgr.dispatch_committed(entries);
        mgr.busy.leave();
    }
}
