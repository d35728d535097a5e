//! Static configuration of the backing cache.
//!
//! The manager never configures the cache; it only inspects these settings
//! to decide which structures the cache can host.

/// Replication mode of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Entries live on this node only.
    Local,
    /// Every node holds every entry.
    Replicated,
    /// Entries are partitioned across the cluster.
    Partitioned,
}

/// Whether writes go through cluster transactions or per-key atomic updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicityMode {
    /// Multi-key transactions with configurable isolation.
    Transactional,
    /// Per-key linearizable updates, no transactions.
    Atomic,
}

/// Write ordering for atomic caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrderMode {
    /// Writes are ordered by the primary node.
    Primary,
    /// Writes are ordered by loosely synchronized clocks.
    Clock,
}

/// Cache settings the data-structures layer inspects.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Replication mode.
    pub mode: CacheMode,
    /// Atomicity mode.
    pub atomicity: AtomicityMode,
    /// Write ordering (meaningful for atomic caches).
    pub write_order: WriteOrderMode,
    /// Whether a near cache is enabled on this node.
    pub near_enabled: bool,
    /// How many sequence ids a node reserves per range.
    pub sequence_reserve_size: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Replicated,
            atomicity: AtomicityMode::Transactional,
            write_order: WriteOrderMode::Primary,
            near_enabled: true,
            sequence_reserve_size: DEFAULT_SEQUENCE_RESERVE,
        }
    }
}

/// Default sequence reservation range.
pub const DEFAULT_SEQUENCE_RESERVE: i64 = 1000;

impl CacheConfig {
    /// Whether the cache is local-only.
    pub fn is_local(&self) -> bool {
        self.mode == CacheMode::Local
    }

    /// Whether the cache is fully replicated.
    pub fn is_replicated(&self) -> bool {
        self.mode == CacheMode::Replicated
    }

    /// Whether the cache is partitioned.
    pub fn is_partitioned(&self) -> bool {
        self.mode == CacheMode::Partitioned
    }

    /// Whether the cache supports transactions.
    pub fn transactional(&self) -> bool {
        self.atomicity == AtomicityMode::Transactional
    }

    /// Whether the cache applies per-key atomic updates.
    pub fn atomic(&self) -> bool {
        self.atomicity == AtomicityMode::Atomic
    }
}
