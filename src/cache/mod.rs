//! The backing-cache contract and its embedded implementation.
//!
//! The data-structures layer consumes a cluster-wide transactional key-value
//! cache through the [`ClusterCache`] trait: raw string entries, scoped
//! pessimistic transactions, per-entry transforms, a broadcast change feed
//! and a commit hook. [`MemoryCache`] is the embedded in-process backend with
//! local/replicated semantics, used both as a test fixture and as a
//! single-process deployment option. Typed access goes through
//! [`CacheView`].

pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod tx;
pub mod view;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use config::{AtomicityMode, CacheConfig, CacheMode, WriteOrderMode};
pub use error::CacheError;
pub use events::{CacheEvent, EntryTransform};
pub use memory::MemoryCache;
pub use tx::{CacheTx, CommitHook, EntryOp, TxConcurrency, TxIsolation, WriteEntry};
pub use view::{CacheView, RecordTransform};

/// Shared handle to a cache backend.
pub type SharedCache = Arc<dyn ClusterCache>;

/// The cluster cache consumed by the data-structures manager.
///
/// All methods operate on raw string-encoded entries; typed access is
/// layered on top by [`CacheView`]. Values returned by reads are decoded
/// copies, logically independent of the stored entry.
#[async_trait]
pub trait ClusterCache: Send + Sync {
    /// Cache name, used in diagnostics.
    fn name(&self) -> &str;

    /// Static cache configuration.
    fn config(&self) -> &CacheConfig;

    /// Read the committed value of a key.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a key unconditionally.
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Insert a key only if absent. Returns the existing value when the
    /// insert lost.
    async fn put_if_absent(&self, key: &str, value: &str)
        -> Result<Option<String>, CacheError>;

    /// Remove a key, returning the previous value.
    async fn remove(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Atomically transform one entry. Returns the `(old, new)` raw values
    /// observed by the transform.
    async fn transform(
        &self,
        key: &str,
        xform: &dyn EntryTransform,
    ) -> Result<(Option<String>, Option<String>), CacheError>;

    /// Open a scoped transaction.
    async fn tx_start(
        &self,
        concurrency: TxConcurrency,
        isolation: TxIsolation,
    ) -> Result<Box<dyn CacheTx>, CacheError>;

    /// Register an observer of locally committed transactions.
    fn register_commit_hook(&self, hook: Arc<dyn CommitHook>);

    /// Subscribe to the change feed.
    fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;

    /// Drop an entry at its current version without running a transaction
    /// or publishing a change event. Used by commit callbacks that have
    /// already dispatched the removal locally.
    fn mark_obsolete(&self, key: &str);
}
