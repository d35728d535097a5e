//! Header transforms shipped to the cache's transform primitive.
//!
//! Each variant is a data-only description of one mutation; `apply` is pure
//! so the cache can replay it on whichever node owns the entry. Every
//! variant carries the queue incarnation id it was issued for and leaves a
//! foreign header untouched, so a queue recreated under the same name can
//! never be mutated through a stale proxy. Callers recover the outcome
//! (reserved slot, drained range, full/empty, wrong incarnation) from the
//! `(old, new)` pair the transform primitive returns.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::RecordTransform;
use crate::structures::values::QueueHeader;

/// Mutations of a queue header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueHeaderFn {
    /// Claim the next tail slot for an offer; no-op when the queue is full.
    ReserveTail {
        /// Incarnation the offer was issued against.
        id: Uuid,
    },
    /// Advance the head past a polled element; no-op when the queue is
    /// empty.
    AdvanceHead {
        /// Incarnation the poll was issued against.
        id: Uuid,
    },
    /// Drain the whole `[head, tail)` window.
    Clear {
        /// Incarnation the clear was issued against.
        id: Uuid,
    },
}

impl QueueHeaderFn {
    fn issued_for(&self) -> Uuid {
        match self {
            QueueHeaderFn::ReserveTail { id }
            | QueueHeaderFn::AdvanceHead { id }
            | QueueHeaderFn::Clear { id } => *id,
        }
    }
}

impl RecordTransform<QueueHeader> for QueueHeaderFn {
    fn apply(&self, old: Option<QueueHeader>) -> Option<QueueHeader> {
        let hdr = old?;

        // Foreign incarnations and tombstoned headers are left untouched;
        // the caller reads the mismatch off the returned pair.
        if hdr.id != self.issued_for() || hdr.removed {
            return Some(hdr);
        }

        match self {
            QueueHeaderFn::ReserveTail { .. } => {
                if hdr.full() {
                    Some(hdr)
                } else {
                    Some(QueueHeader {
                        tail: hdr.tail + 1,
                        ..hdr
                    })
                }
            }
            QueueHeaderFn::AdvanceHead { .. } => {
                if hdr.empty() {
                    Some(hdr)
                } else {
                    Some(QueueHeader {
                        head: hdr.head + 1,
                        ..hdr
                    })
                }
            }
            QueueHeaderFn::Clear { .. } => Some(QueueHeader {
                head: hdr.tail,
                ..hdr
            }),
        }
    }
}
