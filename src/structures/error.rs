//! Error types for the data-structures layer.

use snafu::Snafu;

use crate::cache::CacheError;
use crate::structures::values::StructureKind;

/// Errors surfaced by the data-structures manager and its proxies.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StructuresError {
    /// The manager never completed its one-shot initialization.
    #[snafu(display("data structures manager was not properly initialized for cache '{cache}'"))]
    NotInitialized {
        /// The backing cache name.
        cache: String,
    },

    /// Waiting for initialization was interrupted.
    #[snafu(display("interrupted while waiting for manager initialization"))]
    Interrupted,

    /// The cache configuration forbids the requested structure.
    #[snafu(display("cache configuration does not support this structure: {reason}"))]
    ModeMismatch {
        /// Which configuration rule was violated.
        reason: String,
    },

    /// An entry or local proxy under this name exists with a different kind.
    #[snafu(display(
        "data structure '{name}' has conflicting type [expected={expected}, actual={actual}]"
    ))]
    TypeMismatch {
        /// Structure name.
        name: String,
        /// The kind the caller asked for.
        expected: StructureKind,
        /// The kind actually registered or stored.
        actual: StructureKind,
    },

    /// A queue with this name exists with a different capacity or
    /// collocation flag.
    #[snafu(display(
        "queue '{name}' already exists with a different configuration \
         [capacity={capacity}, collocated={collocated}]"
    ))]
    QueueConflict {
        /// Queue name.
        name: String,
        /// Existing capacity.
        capacity: i32,
        /// Existing collocation flag.
        collocated: bool,
    },

    /// Attempted to remove a latch whose count has not reached zero.
    #[snafu(display("failed to remove count down latch '{name}' with non-zero count: {count}"))]
    BusyLatch {
        /// Latch name.
        name: String,
        /// Remaining count.
        count: i32,
    },

    /// Operation on a proxy whose backing entry has been removed.
    #[snafu(display("data structure '{name}' has been removed"))]
    Removed {
        /// Structure name.
        name: String,
    },

    /// The queue's header is gone from the cache.
    #[snafu(display("queue '{name}' has been removed"))]
    QueueRemoved {
        /// Queue name.
        name: String,
    },

    /// The local node is shutting down.
    #[snafu(display("node is stopping"))]
    NodeStopping,

    /// A sequence reservation would overflow the id range.
    #[snafu(display("sequence '{name}' cannot reserve past the end of the id range"))]
    SequenceOverflow {
        /// Sequence name.
        name: String,
    },

    /// An underlying cache operation failed.
    #[snafu(display("cache operation failed: {source}"))]
    #[snafu(context(false))]
    Cache {
        /// The wrapped cache failure.
        source: CacheError,
    },
}
