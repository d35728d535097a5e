//! Embedded in-process cache backend.
//!
//! [`MemoryCache`] implements the full [`ClusterCache`] contract against
//! process-local state: a committed entry map, a per-key async lock table
//! for pessimistic transactions, a broadcast change feed and a commit hook
//! list. It behaves like a local or replicated cache in that every
//! registered commit hook observes every committed transaction, which makes
//! it both the deterministic test backend and a usable single-process
//! deployment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::cache::config::CacheConfig;
use crate::cache::error::CacheError;
use crate::cache::events::{CacheEvent, EntryTransform};
use crate::cache::tx::{CacheTx, CommitHook, EntryOp, TxConcurrency, TxIsolation, WriteEntry};
use crate::cache::ClusterCache;

/// Change feed buffer; slow subscribers observe a lag error, never block
/// writers.
const EVENT_BUFFER: usize = 256;

struct CacheState {
    entries: DashMap<String, String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    events: broadcast::Sender<CacheEvent>,
    hooks: RwLock<Vec<Arc<dyn CommitHook>>>,
}

impl CacheState {
    fn lock_handle(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn publish(&self, key: &str, old: Option<String>, new: Option<String>) {
        // No receivers is fine; the feed is best-effort broadcast.
        let _ = self.events.send(CacheEvent {
            key: key.to_string(),
            old,
            new,
        });
    }

    fn dispatch_commit(&self, entries: &[WriteEntry]) {
        let hooks: Vec<_> = self.hooks.read().iter().cloned().collect();

        for hook in hooks {
            hook.on_committed(entries);
        }
    }
}

/// In-process [`ClusterCache`] backend.
pub struct MemoryCache {
    name: String,
    config: CacheConfig,
    state: Arc<CacheState>,
}

impl MemoryCache {
    /// Create a cache with the default (replicated, transactional)
    /// configuration.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_config(name, CacheConfig::default())
    }

    /// Create a cache with an explicit configuration.
    pub fn with_config(name: impl Into<String>, config: CacheConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Arc::new(Self {
            name: name.into(),
            config,
            state: Arc::new(CacheState {
                entries: DashMap::new(),
                locks: DashMap::new(),
                events,
                hooks: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Number of committed entries, for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.state.entries.len()
    }

    /// Whether the cache holds no committed entries.
    pub fn is_empty(&self) -> bool {
        self.state.entries.is_empty()
    }
}

#[async_trait]
impl ClusterCache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &CacheConfig {
        &self.config
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.state.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let lock = self.state.lock_handle(key);
        let _guard = lock.lock().await;

        let old = self.state.entries.insert(key.to_string(), value.to_string());
        self.state.publish(key, old, Some(value.to_string()));

        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<String>, CacheError> {
        let lock = self.state.lock_handle(key);
        let _guard = lock.lock().await;

        if let Some(existing) = self.state.entries.get(key) {
            return Ok(Some(existing.value().clone()));
        }

        self.state.entries.insert(key.to_string(), value.to_string());
        self.state.publish(key, None, Some(value.to_string()));

        Ok(None)
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, CacheError> {
        let lock = self.state.lock_handle(key);
        let _guard = lock.lock().await;

        let old = self.state.entries.remove(key).map(|(_, v)| v);

        if old.is_some() {
            self.state.publish(key, old.clone(), None);
        }

        Ok(old)
    }

    async fn transform(
        &self,
        key: &str,
        xform: &dyn EntryTransform,
    ) -> Result<(Option<String>, Option<String>), CacheError> {
        let lock = self.state.lock_handle(key);
        let _guard = lock.lock().await;

        let old = self.state.entries.get(key).map(|e| e.value().clone());
        let new = xform.apply(old.as_deref())?;

        if new != old {
            match &new {
                Some(v) => {
                    self.state.entries.insert(key.to_string(), v.clone());
                }
                None => {
                    self.state.entries.remove(key);
                }
            }

            self.state.publish(key, old.clone(), new.clone());
        }

        Ok((old, new))
    }

    async fn tx_start(
        &self,
        concurrency: TxConcurrency,
        isolation: TxIsolation,
    ) -> Result<Box<dyn CacheTx>, CacheError> {
        if concurrency != TxConcurrency::Pessimistic {
            return Err(CacheError::UnsupportedTx {
                reason: format!("{concurrency:?} concurrency"),
            });
        }

        if isolation == TxIsolation::Serializable {
            return Err(CacheError::UnsupportedTx {
                reason: "serializable isolation".to_string(),
            });
        }

        Ok(Box::new(MemoryTx {
            state: self.state.clone(),
            guards: HashMap::new(),
            snapshot: HashMap::new(),
            writes: HashMap::new(),
            write_order: Vec::new(),
            rollback_only: false,
        }))
    }

    fn register_commit_hook(&self, hook: Arc<dyn CommitHook>) {
        self.state.hooks.write().push(hook);
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.state.events.subscribe()
    }

    fn mark_obsolete(&self, key: &str) {
        self.state.entries.remove(key);
    }
}

/// Pessimistic repeatable-read transaction over [`MemoryCache`].
///
/// The key lock is taken on first touch and held until commit or drop;
/// reads are snapshotted so repeated gets observe stable values.
struct MemoryTx {
    state: Arc<CacheState>,
    guards: HashMap<String, OwnedMutexGuard<()>>,
    snapshot: HashMap<String, Option<String>>,
    writes: HashMap<String, Option<String>>,
    write_order: Vec<String>,
    rollback_only: bool,
}

impl MemoryTx {
    async fn acquire(&mut self, key: &str) {
        if self.guards.contains_key(key) {
            return;
        }

        let lock = self.state.lock_handle(key);
        let guard = lock.lock_owned().await;
        self.guards.insert(key.to_string(), guard);
    }

    async fn stable_read(&mut self, key: &str) -> Option<String> {
        self.acquire(key).await;

        if let Some(snap) = self.snapshot.get(key) {
            return snap.clone();
        }

        let committed = self.state.entries.get(key).map(|e| e.value().clone());
        self.snapshot.insert(key.to_string(), committed.clone());

        committed
    }

    fn record_write(&mut self, key: &str, value: Option<String>) {
        if !self.writes.contains_key(key) {
            self.write_order.push(key.to_string());
        }

        self.writes.insert(key.to_string(), value);
    }
}

#[async_trait]
impl CacheTx for MemoryTx {
    async fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }

        Ok(self.stable_read(key).await)
    }

    async fn put(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        self.acquire(key).await;
        self.record_write(key, Some(value.to_string()));

        Ok(())
    }

    async fn remove(&mut self, key: &str) -> Result<bool, CacheError> {
        let existed = self.get(key).await?.is_some();
        self.record_write(key, None);

        Ok(existed)
    }

    fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    async fn commit(mut self: Box<Self>) -> Result<(), CacheError> {
        if self.rollback_only {
            return Err(CacheError::RollbackOnly);
        }

        let mut committed = Vec::with_capacity(self.write_order.len());

        for key in &self.write_order {
            let new = self.writes.get(key).cloned().flatten();
            let old = self.state.entries.get(key).map(|e| e.value().clone());

            let op = match (&old, &new) {
                (None, None) => continue,
                (None, Some(_)) => EntryOp::Create,
                (Some(_), Some(_)) => EntryOp::Update,
                (Some(_), None) => EntryOp::Delete,
            };

            match &new {
                Some(v) => {
                    self.state.entries.insert(key.clone(), v.clone());
                }
                None => {
                    self.state.entries.remove(key);
                }
            }

            committed.push((key.clone(), old, new, op));
        }

        // Release entry locks before notifying observers.
        self.guards.clear();

        let entries: Vec<WriteEntry> = committed
            .iter()
            .map(|(key, _, new, op)| WriteEntry {
                op: *op,
                key: key.clone(),
                value: new.clone(),
            })
            .collect();

        for (key, old, new, _) in committed {
            self.state.publish(&key, old, new);
        }

        if !entries.is_empty() {
            self.state.dispatch_commit(&entries);
        }

        Ok(())
    }
}
