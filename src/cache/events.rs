//! The cache change feed and entry transforms.
//!
//! The continuous-query mechanism of the underlying platform is modeled as a
//! broadcast stream of [`CacheEvent`]s; consumers filter by key and own their
//! subscription for its whole lifetime.

use crate::cache::error::CacheError;

/// A single observed change to a cache entry.
///
/// `old == None` means the entry was created, `new == None` that it was
/// removed. Values are the raw stored encoding.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// The affected cache key.
    pub key: String,
    /// Value before the change.
    pub old: Option<String>,
    /// Value after the change.
    pub new: Option<String>,
}

/// A transform applied atomically to a single entry.
///
/// Transforms are values: data-only descriptions of the mutation that the
/// platform can ship to the entry's primary node and replay there. `apply`
/// must be pure.
pub trait EntryTransform: Send + Sync {
    /// Compute the new raw value from the current one. Returning `None`
    /// removes the entry; returning the input unchanged is a no-op.
    fn apply(&self, old: Option<&str>) -> Result<Option<String>, CacheError>;
}
