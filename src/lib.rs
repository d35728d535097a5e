//! Trellis: named distributed coordination primitives over a transactional
//! key-value cache.
//!
//! A [`DataStructuresManager`] turns a shared cache into a set of named,
//! strongly consistent data structures: an atomic long, an atomic reference,
//! an atomic stamped reference, a monotonic sequence generator with local
//! range reservation, a count-down latch and a bounded FIFO queue. Each is
//! identified by a user-visible string name and backed by one or more cache
//! entries; every node holding a proxy for a name observes remote changes
//! through the cache's commit hook and change feed, without polling.
//!
//! The backing cache is consumed through the [`cache::ClusterCache`]
//! contract. [`cache::MemoryCache`] is the embedded in-process backend with
//! local/replicated semantics:
//!
//! ```ignore
//! use trellis::cache::MemoryCache;
//! use trellis::DataStructuresManager;
//!
//! let cache = MemoryCache::new("coordination");
//! let manager = DataStructuresManager::new(cache);
//! manager.start();
//!
//! let counter = manager.atomic_long("hits", 0, true).await?.unwrap();
//! counter.increment_and_get().await?;
//!
//! let latch = manager.count_down_latch("ready", 3, true, true).await?.unwrap();
//! latch.count_down().await?;
//! ```

#![warn(missing_docs)]

/// The backing-cache contract and the embedded in-process backend.
pub mod cache;
/// The named data structures and their manager.
pub mod structures;
/// Shared synchronization helpers.
pub mod utils;

pub use structures::{
    AtomicLong, AtomicReference, AtomicSequence, AtomicStamped, CountDownLatch,
    DataStructuresManager, MemoryStats, Queue, StructureKind, StructuresError,
};
