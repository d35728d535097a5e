//! Scoped cache transactions and the commit hook contract.

use async_trait::async_trait;

use crate::cache::error::CacheError;

/// Transaction concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxConcurrency {
    /// Locks are acquired on first access to each key.
    Pessimistic,
    /// Conflicts are detected at commit time.
    Optimistic,
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxIsolation {
    /// Reads see the latest committed value each time.
    ReadCommitted,
    /// Reads are stable for the lifetime of the transaction.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

/// Operation recorded for one key written by a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOp {
    /// The key did not exist before the transaction.
    Create,
    /// The key existed and was overwritten.
    Update,
    /// The key was removed.
    Delete,
}

/// One write performed by a committed transaction.
#[derive(Debug, Clone)]
pub struct WriteEntry {
    /// What happened to the key.
    pub op: EntryOp,
    /// The cache key.
    pub key: String,
    /// The committed value; `None` for deletes.
    pub value: Option<String>,
}

/// Observer of locally committed transactions.
///
/// Hooks run synchronously on the committing path after the writes have been
/// applied and the entry locks released. Implementations must not block.
pub trait CommitHook: Send + Sync {
    /// Called once per committed transaction with its write set.
    fn on_committed(&self, entries: &[WriteEntry]);
}

/// A scoped cache transaction.
///
/// Dropping a transaction without committing rolls it back and releases all
/// of its locks; release is guaranteed on every exit path.
#[async_trait]
pub trait CacheTx: Send {
    /// Read a key inside the transaction, acquiring its lock if needed.
    async fn get(&mut self, key: &str) -> Result<Option<String>, CacheError>;

    /// Buffer a write to a key, acquiring its lock if needed.
    async fn put(&mut self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Buffer a removal. Returns whether the key currently exists from this
    /// transaction's point of view.
    async fn remove(&mut self, key: &str) -> Result<bool, CacheError>;

    /// Mark the transaction so that a later [`CacheTx::commit`] refuses to
    /// apply it.
    fn set_rollback_only(&mut self);

    /// Atomically apply the buffered writes and release all locks.
    async fn commit(self: Box<Self>) -> Result<(), CacheError>;
}
