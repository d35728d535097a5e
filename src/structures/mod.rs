//! Named distributed data structures over the backing cache.
//!
//! This module provides the coordination primitives themselves:
//!
//! - [`AtomicSequence`] - Monotonic id generator with local range reservation
//! - [`AtomicLong`] - Cluster-wide atomic long
//! - [`AtomicReference`] / [`AtomicStamped`] - Typed atomic references
//! - [`CountDownLatch`] - Cluster-wide count-down latch
//! - [`Queue`] - Bounded FIFO queue
//!
//! All of them are created, looked up and removed through the
//! [`DataStructuresManager`], which owns the local proxy registries and the
//! cross-node notification plumbing.

mod atomic_long;
mod error;
mod keys;
mod latch;
mod manager;
mod queue;
mod reference;
mod sequence;
mod transforms;
mod values;

pub use atomic_long::AtomicLong;
pub use error::StructuresError;
pub use keys::{QueueHeaderKey, QueueItemKey, StructureKey};
pub use latch::CountDownLatch;
pub use manager::{DataStructuresManager, MemoryStats};
pub use queue::{Queue, QueueProxy};
pub use reference::{AtomicReference, AtomicStamped, ReferenceProxy, StampedProxy};
pub use sequence::AtomicSequence;
pub use transforms::QueueHeaderFn;
pub use values::{
    AtomicLongValue, AtomicReferenceValue, AtomicStampedValue, LatchValue, QueueHeader,
    SequenceValue, StructureKind, StructureValue,
};
