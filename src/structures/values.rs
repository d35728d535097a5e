//! Cache-resident value records for named structures.
//!
//! Scalar records are stored behind one kind-tagged union,
//! [`StructureValue`]; extracting a record through the wrong kind is a
//! [`TypeMismatch`](crate::structures::StructuresError::TypeMismatch), which
//! replaces the class-token downcast of runtime-typed platforms.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{CacheTx, CacheView, SharedCache};
use crate::structures::error::{StructuresError, TypeMismatchSnafu};
use crate::structures::keys::StructureKey;

/// Discriminator for every scalar structure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    /// Monotonic sequence generator.
    Sequence,
    /// Atomic long.
    AtomicLong,
    /// Atomic reference.
    AtomicReference,
    /// Atomic stamped reference.
    AtomicStamped,
    /// Count-down latch.
    Latch,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StructureKind::Sequence => "sequence",
            StructureKind::AtomicLong => "atomic-long",
            StructureKind::AtomicReference => "atomic-reference",
            StructureKind::AtomicStamped => "atomic-stamped",
            StructureKind::Latch => "count-down-latch",
        };

        write!(f, "{s}")
    }
}

/// Persistent state of a sequence: the next globally unreserved id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceValue {
    /// Next unreserved id.
    pub next: i64,
}

/// Persistent state of an atomic long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicLongValue {
    /// Current value.
    pub v: i64,
}

/// Persistent state of an atomic reference. The payload is erased to JSON;
/// typed handles encode and decode at the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicReferenceValue {
    /// Current payload.
    pub v: Value,
}

/// Persistent state of an atomic stamped reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicStampedValue {
    /// Current payload.
    pub v: Value,
    /// Current stamp.
    pub stamp: Value,
}

/// Persistent state of a count-down latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatchValue {
    /// Remaining count; `0 <= count <= initial_count`.
    pub count: i32,
    /// Count the latch was created with.
    pub initial_count: i32,
    /// Whether the latch deletes itself once the count reaches zero.
    pub auto_delete: bool,
}

/// Header describing one bounded FIFO queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHeader {
    /// Identity of this queue incarnation; a recreated queue under the same
    /// name gets a fresh id.
    pub id: Uuid,
    /// Maximum number of elements; `0` means unbounded.
    pub capacity: i32,
    /// Whether all elements collocate with the header.
    pub collocated: bool,
    /// Index of the oldest element.
    pub head: i64,
    /// Index one past the newest element.
    pub tail: i64,
    /// Tombstone flag set while the queue is being destroyed.
    pub removed: bool,
}

impl QueueHeader {
    /// Fresh header for a new queue.
    pub fn new(id: Uuid, capacity: i32, collocated: bool) -> Self {
        Self {
            id,
            capacity,
            collocated,
            head: 0,
            tail: 0,
            removed: false,
        }
    }

    /// Number of elements currently threaded through the header.
    pub fn size(&self) -> i64 {
        self.tail - self.head
    }

    /// Whether the queue holds no elements.
    pub fn empty(&self) -> bool {
        self.head == self.tail
    }

    /// Whether another element would exceed the capacity bound.
    pub fn full(&self) -> bool {
        self.capacity > 0 && self.size() >= i64::from(self.capacity)
    }
}

/// Kind-tagged union of every scalar structure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureValue {
    /// A sequence record.
    Sequence(SequenceValue),
    /// An atomic long record.
    AtomicLong(AtomicLongValue),
    /// An atomic reference record.
    AtomicReference(AtomicReferenceValue),
    /// An atomic stamped record.
    AtomicStamped(AtomicStampedValue),
    /// A latch record.
    Latch(LatchValue),
}

impl StructureValue {
    /// The kind tag of this record.
    pub fn kind(&self) -> StructureKind {
        match self {
            StructureValue::Sequence(_) => StructureKind::Sequence,
            StructureValue::AtomicLong(_) => StructureKind::AtomicLong,
            StructureValue::AtomicReference(_) => StructureKind::AtomicReference,
            StructureValue::AtomicStamped(_) => StructureKind::AtomicStamped,
            StructureValue::Latch(_) => StructureKind::Latch,
        }
    }
}

/// A record type that lives inside [`StructureValue`].
pub trait StructureRecord: Sized + Send + Sync {
    /// The kind tag for this record type.
    const KIND: StructureKind;

    /// Wrap the record into the union.
    fn wrap(self) -> StructureValue;

    /// Extract the record if the union holds this kind.
    fn unwrap_kind(value: StructureValue) -> Option<Self>;
}

macro_rules! impl_structure_record {
    ($record:ty, $variant:ident, $kind:expr) => {
        impl StructureRecord for $record {
            const KIND: StructureKind = $kind;

            fn wrap(self) -> StructureValue {
                StructureValue::$variant(self)
            }

            fn unwrap_kind(value: StructureValue) -> Option<Self> {
                match value {
                    StructureValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_structure_record!(SequenceValue, Sequence, StructureKind::Sequence);
impl_structure_record!(AtomicLongValue, AtomicLong, StructureKind::AtomicLong);
impl_structure_record!(
    AtomicReferenceValue,
    AtomicReference,
    StructureKind::AtomicReference
);
impl_structure_record!(AtomicStampedValue, AtomicStamped, StructureKind::AtomicStamped);
impl_structure_record!(LatchValue, Latch, StructureKind::Latch);

/// Extract a record of kind `R` from a read union value, surfacing a
/// [`TypeMismatch`](StructuresError::TypeMismatch) when the stored kind
/// differs.
pub fn expect_kind<R: StructureRecord>(
    name: &str,
    value: Option<StructureValue>,
) -> Result<Option<R>, StructuresError> {
    match value {
        None => Ok(None),
        Some(v) => {
            let actual = v.kind();

            match R::unwrap_kind(v) {
                Some(r) => Ok(Some(r)),
                None => TypeMismatchSnafu {
                    name,
                    expected: R::KIND,
                    actual,
                }
                .fail(),
            }
        }
    }
}

/// Per-kind projection over the scalar structure entries.
///
/// Reads decode the tagged union and then demand one kind, so a
/// wrongly-kinded entry surfaces as `TypeMismatch` instead of leaking a
/// foreign record.
pub(crate) struct KindView<R> {
    view: CacheView<StructureValue>,
    _kind: std::marker::PhantomData<fn() -> R>,
}

impl<R> Clone for KindView<R> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<R: StructureRecord> KindView<R> {
    pub(crate) fn new(cache: SharedCache) -> Self {
        Self {
            view: CacheView::new(cache),
            _kind: std::marker::PhantomData,
        }
    }

    pub(crate) async fn get(&self, key: &StructureKey) -> Result<Option<R>, StructuresError> {
        let value = self.view.get(&key.cache_key()).await?;

        expect_kind(key.name(), value)
    }

    pub(crate) async fn get_in(
        &self,
        tx: &mut dyn CacheTx,
        key: &StructureKey,
    ) -> Result<Option<R>, StructuresError> {
        let value = self.view.get_in(tx, &key.cache_key()).await?;

        expect_kind(key.name(), value)
    }

    pub(crate) async fn put_in(
        &self,
        tx: &mut dyn CacheTx,
        key: &StructureKey,
        record: R,
    ) -> Result<(), StructuresError> {
        self.view.put_in(tx, &key.cache_key(), &record.wrap()).await?;

        Ok(())
    }

    pub(crate) async fn remove_in(
        &self,
        tx: &mut dyn CacheTx,
        key: &StructureKey,
    ) -> Result<bool, StructuresError> {
        Ok(self.view.remove_in(tx, &key.cache_key()).await?)
    }
}
