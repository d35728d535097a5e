//! Cache keys for named structures.
//!
//! Scalar structures (sequence, atomic long, reference, stamped, latch)
//! share one key family addressed by name; queue headers and queue items
//! use distinct families so they can never collide with scalars stored in
//! the same cache. Each typed key renders to a prefixed raw cache key.

use std::fmt;

use uuid::Uuid;

/// Raw-key prefix for scalar structure entries.
pub const STRUCTURE_PREFIX: &str = "__ds:";

/// Raw-key prefix for queue header entries.
pub const QUEUE_HEADER_PREFIX: &str = "__queue-hdr:";

/// Raw-key prefix for queue item entries.
pub const QUEUE_ITEM_PREFIX: &str = "__queue-item:";

/// Key of a scalar structure entry; identity is the user-visible name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructureKey {
    name: String,
}

impl StructureKey {
    /// Key for the structure with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The user-visible structure name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw cache key this structure is stored under.
    pub fn cache_key(&self) -> String {
        format!("{STRUCTURE_PREFIX}{}", self.name)
    }

    /// Recover a structure name from a raw cache key.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix(STRUCTURE_PREFIX).map(Self::new)
    }
}

impl fmt::Display for StructureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Key of a queue header entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHeaderKey {
    name: String,
}

impl QueueHeaderKey {
    /// Header key for the queue with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The user-visible queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw cache key this header is stored under.
    pub fn cache_key(&self) -> String {
        format!("{QUEUE_HEADER_PREFIX}{}", self.name)
    }

    /// Recover a queue name from a raw cache key.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix(QUEUE_HEADER_PREFIX).map(Self::new)
    }
}

impl fmt::Display for QueueHeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Key of one queue element, addressed by queue identity and slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueItemKey {
    /// Identity of the owning queue header.
    pub id: Uuid,
    /// Slot index in the queue's `[head, tail)` window.
    pub idx: i64,
}

impl QueueItemKey {
    /// Item key for the given queue identity and slot.
    pub fn new(id: Uuid, idx: i64) -> Self {
        Self { id, idx }
    }

    /// The raw cache key this item is stored under.
    pub fn cache_key(&self) -> String {
        format!("{QUEUE_ITEM_PREFIX}{}:{}", self.id, self.idx)
    }
}
