//! Atomic long proxy.
//!
//! Every mutation is a single-entry pessimistic transaction on the backing
//! record, so concurrent updates from any node serialize on the entry lock.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::{CacheTx, ClusterCache, SharedCache, TxConcurrency, TxIsolation};
use crate::structures::error::{RemovedSnafu, StructuresError};
use crate::structures::keys::StructureKey;
use crate::structures::values::{AtomicLongValue, KindView};

/// Local proxy of a named atomic long.
pub struct AtomicLong {
    name: String,
    key: StructureKey,
    cache: SharedCache,
    view: KindView<AtomicLongValue>,
    removed: AtomicBool,
}

impl AtomicLong {
    pub(crate) fn new(name: impl Into<String>, cache: SharedCache) -> Self {
        let name = name.into();

        Self {
            key: StructureKey::new(name.clone()),
            view: KindView::new(cache.clone()),
            cache,
            removed: AtomicBool::new(false),
            name,
        }
    }

    /// The user-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the current value.
    pub async fn get(&self) -> Result<i64, StructuresError> {
        self.ensure_active()?;

        match self.view.get(&self.key).await? {
            Some(v) => Ok(v.v),
            None => RemovedSnafu { name: &self.name }.fail(),
        }
    }

    /// Add one and return the new value.
    pub async fn increment_and_get(&self) -> Result<i64, StructuresError> {
        self.add_and_get(1).await
    }

    /// Add one and return the previous value.
    pub async fn get_and_increment(&self) -> Result<i64, StructuresError> {
        self.get_and_add(1).await
    }

    /// Subtract one and return the new value.
    pub async fn decrement_and_get(&self) -> Result<i64, StructuresError> {
        self.add_and_get(-1).await
    }

    /// Add `delta` and return the new value.
    pub async fn add_and_get(&self, delta: i64) -> Result<i64, StructuresError> {
        let (_, new) = self.apply_delta(delta).await?;

        Ok(new)
    }

    /// Add `delta` and return the previous value.
    pub async fn get_and_add(&self, delta: i64) -> Result<i64, StructuresError> {
        let (old, _) = self.apply_delta(delta).await?;

        Ok(old)
    }

    /// Replace the value, returning the previous one.
    pub async fn get_and_set(&self, value: i64) -> Result<i64, StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;
        let old = self.read_required(tx.as_mut()).await?;

        self.view
            .put_in(tx.as_mut(), &self.key, AtomicLongValue { v: value })
            .await?;
        tx.commit().await?;

        Ok(old)
    }

    /// Set the value to `new` only if it currently equals `expect`.
    pub async fn compare_and_set(&self, expect: i64, new: i64) -> Result<bool, StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;
        let old = self.read_required(tx.as_mut()).await?;

        if old != expect {
            // Dropping the transaction rolls back and releases the lock.
            return Ok(false);
        }

        self.view
            .put_in(tx.as_mut(), &self.key, AtomicLongValue { v: new })
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn apply_delta(&self, delta: i64) -> Result<(i64, i64), StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;
        let old = self.read_required(tx.as_mut()).await?;
        let new = old.saturating_add(delta);

        self.view
            .put_in(tx.as_mut(), &self.key, AtomicLongValue { v: new })
            .await?;
        tx.commit().await?;

        Ok((old, new))
    }

    async fn read_required(&self, tx: &mut dyn CacheTx) -> Result<i64, StructuresError> {
        match self.view.get_in(tx, &self.key).await? {
            Some(v) => Ok(v.v),
            None => RemovedSnafu { name: &self.name }.fail(),
        }
    }

    async fn tx_internal(&self) -> Result<Box<dyn CacheTx>, StructuresError> {
        Ok(self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?)
    }

    pub(crate) fn on_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    fn ensure_active(&self) -> Result<(), StructuresError> {
        if self.removed.load(Ordering::Acquire) {
            return RemovedSnafu { name: &self.name }.fail();
        }

        Ok(())
    }
}
