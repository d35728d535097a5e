//! Error types for the backing-cache contract.

use snafu::Snafu;

/// Errors surfaced by cache views, transactions and the change feed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    /// A cache entry could not be decoded into its expected record type.
    #[snafu(display("failed to decode cache entry at '{key}': {source}"))]
    Decode {
        /// Cache key of the offending entry.
        key: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage.
    #[snafu(display("failed to encode cache value: {source}"))]
    Encode {
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Commit was attempted on a transaction marked rollback-only.
    #[snafu(display("transaction is rollback-only"))]
    RollbackOnly,

    /// The requested transaction shape is not supported by the backend.
    #[snafu(display("unsupported transaction mode: {reason}"))]
    UnsupportedTx {
        /// What the caller asked for.
        reason: String,
    },

    /// An operation gave up after exhausting its retry deadline.
    #[snafu(display("timed out waiting on cache entry '{key}' during {operation}"))]
    Timeout {
        /// Cache key being waited on.
        key: String,
        /// Operation that timed out.
        operation: String,
    },

    /// Any other backend failure.
    #[snafu(display("cache backend failure: {message}"))]
    Backend {
        /// Backend-provided description.
        message: String,
    },
}
